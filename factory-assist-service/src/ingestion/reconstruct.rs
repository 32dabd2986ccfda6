//! Spatial reconstruction of page reading order.
//!
//! Text blocks and images are positioned by their lower edge and merged into
//! one top-to-bottom sequence, so a diagram drawn between two paragraphs stays
//! between them in the indexed content. Images are persisted to the
//! [`ImageStore`] and replaced by markdown markers pointing at their public URL.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ProcessingError, describe};

use super::assets::{ImageAsset, ImageStore, asset_name};
use super::fragments::{FragmentContent, PageContent, PageFragment, order_fragments};

/// Separator between rendered fragments
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// The human-reading-order representation of one source page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructedPage {
    pub source_file: String,
    pub page_number: u32,
    pub ordered_content: String,
    pub has_images: bool,
}

/// A reconstructed page plus the asset names it references, in content order
#[derive(Debug, Clone)]
pub struct PageReconstruction {
    pub page: ReconstructedPage,
    pub image_refs: Vec<String>,
}

pub struct SpatialReconstructor {
    images: Arc<ImageStore>,
}

impl SpatialReconstructor {
    pub fn new(images: Arc<ImageStore>) -> Self {
        Self { images }
    }

    /// Turn one page's raw content into positioned fragments, persisting images.
    fn collect_fragments(&self, source_file: &str, page: &PageContent) -> Vec<PageFragment> {
        let mut fragments = Vec::with_capacity(page.images.len() + page.text_blocks.len());

        for (index, image) in page.images.iter().enumerate() {
            let Some(rect) = image.rects.first() else {
                debug!(
                    file = %source_file,
                    page = page.page_number,
                    index,
                    "Image has no placement on page, skipping"
                );
                continue;
            };

            let asset = ImageAsset {
                id: asset_name(source_file, page.page_number, index, &image.extension),
                bytes: image.bytes.clone(),
            };
            if let Err(e) = self.images.persist(&asset) {
                warn!(
                    file = %source_file,
                    page = page.page_number,
                    asset = %asset.id,
                    error = %describe(&e),
                    "Failed to persist image, leaving it out of the page"
                );
                continue;
            }

            fragments.push(PageFragment {
                vertical_position: rect.bottom,
                content: FragmentContent::Image(asset.id),
            });
        }

        for block in &page.text_blocks {
            let text = block.text.trim();
            if text.is_empty() {
                continue;
            }
            fragments.push(PageFragment {
                vertical_position: block.bounds.bottom,
                content: FragmentContent::Text(text.to_string()),
            });
        }

        fragments
    }

    /// Reconstruct a single page.
    pub fn reconstruct_page(&self, source_file: &str, page: &PageContent) -> PageReconstruction {
        let mut fragments = self.collect_fragments(source_file, page);
        order_fragments(&mut fragments);

        let mut image_refs = Vec::new();
        let rendered: Vec<String> = fragments
            .into_iter()
            .map(|fragment| match fragment.content {
                FragmentContent::Text(text) => text,
                FragmentContent::Image(id) => {
                    let marker = self.images.marker_for(&id);
                    image_refs.push(id);
                    marker
                }
            })
            .collect();

        PageReconstruction {
            page: ReconstructedPage {
                source_file: source_file.to_string(),
                page_number: page.page_number,
                ordered_content: rendered.join(FRAGMENT_SEPARATOR),
                has_images: !image_refs.is_empty(),
            },
            image_refs,
        }
    }

    /// Reconstruct every readable page of a document.
    ///
    /// Pages that failed extraction are logged and skipped; the rest of the
    /// document is still returned.
    pub fn reconstruct_document<I>(&self, source_file: &str, pages: I) -> Vec<PageReconstruction>
    where
        I: IntoIterator<Item = Result<PageContent, ProcessingError>>,
    {
        let mut reconstructed = Vec::new();
        let mut skipped = 0usize;

        for page in pages {
            match page {
                Ok(page) => reconstructed.push(self.reconstruct_page(source_file, &page)),
                Err(e) => {
                    skipped += 1;
                    warn!(file = %source_file, error = %describe(&e), "Skipping unreadable page");
                }
            }
        }

        debug!(
            file = %source_file,
            pages = reconstructed.len(),
            skipped,
            "Document reconstructed"
        );

        reconstructed
    }
}
