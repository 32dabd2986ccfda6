//! PDF fragment extraction with pdfium.
//!
//! Each page becomes a [`PageContent`]: text objects grouped into paragraph
//! blocks and image objects re-encoded as PNG, all positioned in top-down
//! coordinates (PDF space is bottom-up, so `y' = page_height - y`).

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{ProcessingError, describe};

use super::fragments::{ImageObject, PageContent, Rect, TextBlock};

/// Vertical gap, relative to line height, above which a new block starts
const PARAGRAPH_GAP_RATIO: f32 = 0.8;

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> Result<Pdfium, ProcessingError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ProcessingError::PdfLoad {
            message: format!("Failed to load PDFium library: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Read every page of a PDF.
///
/// The outer error means the document itself could not be opened. Per-page
/// failures are returned in place so the caller can skip just that page.
pub fn read_pdf_pages(path: &Path) -> Result<Vec<Result<PageContent, ProcessingError>>, ProcessingError> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ProcessingError::PdfLoad {
            message: format!("{}: {:?}", path.display(), e),
        })?;

    let page_count = document.pages().len();
    info!(path = %path.display(), pages = page_count, "Extracting PDF pages");

    Ok(document
        .pages()
        .iter()
        .enumerate()
        .map(|(page_index, page)| read_page(&page, page_index as u32 + 1))
        .collect())
}

/// Re-encode an extracted image as PNG. Failures drop only this image.
fn encode_png(image: &DynamicImage, page_number: u32) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    match image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png) {
        Ok(()) => Some(bytes),
        Err(e) => {
            let e = ProcessingError::ImageEncode(e);
            warn!(page = page_number, error = %describe(&e), "Failed to encode image, skipping");
            None
        }
    }
}

fn read_page(page: &PdfPage, page_number: u32) -> Result<PageContent, ProcessingError> {
    let page_height = page.height().value;
    let mut runs = Vec::new();
    let mut images = Vec::new();

    for object in page.objects().iter() {
        match &object {
            PdfPageObject::Text(text_obj) => {
                let quad = object.bounds().map_err(|e| page_error(page_number, e))?;
                let text = text_obj.text();
                if text.trim().is_empty() {
                    continue;
                }
                runs.push(TextBlock {
                    bounds: to_top_down(&quad.to_rect(), page_height),
                    text,
                });
            }
            PdfPageObject::Image(image_obj) => {
                // Images that pdfium cannot decode are left out rather than failing the page
                let Ok(raw) = image_obj.get_raw_image() else {
                    debug!(page = page_number, "Undecodable image object, skipping");
                    continue;
                };
                let rects = match object.bounds() {
                    Ok(quad) => vec![to_top_down(&quad.to_rect(), page_height)],
                    Err(_) => Vec::new(),
                };

                let Some(bytes) = encode_png(&raw, page_number) else {
                    continue;
                };

                images.push(ImageObject {
                    bytes,
                    extension: "png".to_string(),
                    rects,
                });
            }
            _ => {}
        }
    }

    let text_blocks = group_text_runs(runs);
    debug!(
        page = page_number,
        blocks = text_blocks.len(),
        images = images.len(),
        "Page extracted"
    );

    Ok(PageContent {
        page_number,
        text_blocks,
        images,
    })
}

fn page_error(page: u32, e: PdfiumError) -> ProcessingError {
    ProcessingError::PageExtraction {
        page,
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{:?}", e),
        )),
    }
}

fn to_top_down(rect: &PdfRect, page_height: f32) -> Rect {
    flip_rect(
        rect.left().value,
        rect.bottom().value,
        rect.right().value,
        rect.top().value,
        page_height,
    )
}

/// Convert bottom-up PDF edges to a top-down [`Rect`]
fn flip_rect(left: f32, bottom: f32, right: f32, top: f32, page_height: f32) -> Rect {
    Rect::new(left, page_height - top, right, page_height - bottom)
}

/// Merge line-level text runs into paragraph blocks.
///
/// Runs are visited top to bottom, left to right. A run that overlaps the
/// current line continues it; one that starts within a small gap below the
/// block continues the block on a new line; anything further starts a new block.
pub(crate) fn group_text_runs(mut runs: Vec<TextBlock>) -> Vec<TextBlock> {
    runs.sort_by(|a, b| {
        a.bounds
            .top
            .total_cmp(&b.bounds.top)
            .then(a.bounds.left.total_cmp(&b.bounds.left))
    });

    let mut blocks: Vec<TextBlock> = Vec::new();
    // Bottom edge of the line currently being assembled
    let mut line_bottom = f32::MIN;

    for run in runs {
        let line_height = run.bounds.height().max(1.0);
        let Some(block) = blocks.last_mut() else {
            line_bottom = run.bounds.bottom;
            blocks.push(run);
            continue;
        };

        let same_line = run.bounds.top < line_bottom - line_height * 0.5;
        let next_line = run.bounds.top - block.bounds.bottom <= line_height * PARAGRAPH_GAP_RATIO;

        if same_line {
            if needs_space(&block.text, &run.text) {
                block.text.push(' ');
            }
            block.text.push_str(run.text.trim());
        } else if next_line {
            block.text.push('\n');
            block.text.push_str(run.text.trim());
            line_bottom = run.bounds.bottom;
        } else {
            line_bottom = run.bounds.bottom;
            blocks.push(run);
            continue;
        }

        block.bounds.left = block.bounds.left.min(run.bounds.left);
        block.bounds.right = block.bounds.right.max(run.bounds.right);
        block.bounds.bottom = block.bounds.bottom.max(run.bounds.bottom);
        line_bottom = line_bottom.max(run.bounds.bottom);
    }

    blocks
}

/// CJK text is written without spaces between runs
fn needs_space(before: &str, after: &str) -> bool {
    match (before.chars().last(), after.trim_start().chars().next()) {
        (Some(a), Some(b)) => a.is_ascii() || b.is_ascii(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(top: f32, left: f32, text: &str) -> TextBlock {
        TextBlock {
            bounds: Rect::new(left, top, left + 100.0, top + 10.0),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_encode_png() {
        let bytes = encode_png(&DynamicImage::new_rgb8(2, 2), 1).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_unencodable_image_is_skipped() {
        assert_eq!(encode_png(&DynamicImage::new_rgb8(0, 0), 3), None);
    }

    #[test]
    fn test_consecutive_lines_form_one_block() {
        let blocks = group_text_runs(vec![
            run(100.0, 50.0, "Check the hydraulic"),
            run(112.0, 50.0, "pressure gauge."),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Check the hydraulic\npressure gauge.");
        assert_eq!(blocks[0].bounds.bottom, 122.0);
    }

    #[test]
    fn test_large_gap_starts_new_block() {
        let blocks = group_text_runs(vec![
            run(100.0, 50.0, "Step 1"),
            run(160.0, 50.0, "Step 2"),
        ]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].bounds.bottom, 170.0);
    }

    #[test]
    fn test_runs_on_same_line_are_joined_left_to_right() {
        let blocks = group_text_runs(vec![
            run(100.0, 200.0, "E-102"),
            run(100.0, 50.0, "Error code"),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Error code E-102");
    }

    #[test]
    fn test_cjk_runs_join_without_space() {
        let blocks = group_text_runs(vec![run(100.0, 50.0, "检查液压"), run(100.0, 160.0, "压力表")]);
        assert_eq!(blocks[0].text, "检查液压压力表");
    }

    #[test]
    fn test_top_down_conversion() {
        // PDF rect with bottom 700 and top 720 on an 800pt page
        let converted = flip_rect(50.0, 700.0, 150.0, 720.0, 800.0);
        assert_eq!(converted.top, 80.0);
        assert_eq!(converted.bottom, 100.0);
    }
}
