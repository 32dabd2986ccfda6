//! Document ingestion.
//!
//! Uploads are stored verbatim, read into positioned page content (pdfium for
//! PDFs, paragraph stacking for text), put back into reading order by the
//! [`SpatialReconstructor`] and indexed page by page into the knowledge store.

pub mod assets;
pub mod chunking;
pub mod fragments;
pub mod hash;
pub mod pdf;
pub mod reconstruct;
pub mod text;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ProcessingError, ServiceError, ServiceResult};
use crate::knowledge::KnowledgeStore;

use assets::ImageStore;
use hash::compute_content_hash;
use reconstruct::{PageReconstruction, SpatialReconstructor};

/// Result of ingesting one upload
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub filename: String,
    pub pages: usize,
    pub chunks: usize,
    /// The stored content hash matched, nothing was re-indexed
    pub unchanged: bool,
}

pub struct IngestionService {
    store: Arc<dyn KnowledgeStore>,
    images: Arc<ImageStore>,
    reconstructor: SpatialReconstructor,
    upload_dir: PathBuf,
    max_upload_bytes: u64,
}

/// Reduce a client-supplied upload name to a bare file name.
pub fn sanitize_upload_name(name: &str) -> ServiceResult<String> {
    let name = name.trim().replace('\\', "/");
    let base = name.rsplit('/').next().unwrap_or_default().trim();

    if base.is_empty() || base == "." || base == ".." || base.starts_with('.') {
        return Err(ServiceError::InvalidRequest {
            message: format!("invalid file name: {:?}", name),
        });
    }

    Ok(base.to_string())
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        images: Arc<ImageStore>,
        upload_dir: PathBuf,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            store,
            reconstructor: SpatialReconstructor::new(images.clone()),
            images,
            upload_dir,
            max_upload_bytes,
        }
    }

    /// Store an uploaded document and (re)index it.
    ///
    /// Re-uploading identical bytes under the same name is a no-op. Otherwise the
    /// previous chunks and images of that name are replaced.
    pub async fn ingest_upload(&self, filename: &str, content: &[u8]) -> ServiceResult<IngestOutcome> {
        let filename = sanitize_upload_name(filename)?;

        if content.len() as u64 > self.max_upload_bytes {
            return Err(ProcessingError::FileTooLarge {
                size: content.len() as u64,
                max: self.max_upload_bytes,
            }
            .into());
        }

        let extension = extension_of(&filename);
        if extension != "pdf" && !text::TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ProcessingError::UnsupportedFormat {
                format: if extension.is_empty() {
                    filename.clone()
                } else {
                    extension
                },
            }
            .into());
        }

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(ProcessingError::Io)?;
        let path = self.upload_dir.join(&filename);
        tokio::fs::write(&path, content)
            .await
            .map_err(ProcessingError::Io)?;

        let content_hash = compute_content_hash(content);
        if self.store.content_hash(&filename).await?.as_deref() == Some(content_hash.as_str()) {
            info!(file = %filename, "Upload unchanged, skipping re-ingestion");
            return Ok(IngestOutcome {
                filename,
                pages: 0,
                chunks: 0,
                unchanged: true,
            });
        }

        let started = Instant::now();
        self.remove_indexed(&filename).await?;

        let pages = self.read_pages(&filename, &path, content).await?;
        let page_count = pages.len();

        let mut chunks = 0;
        for reconstruction in &pages {
            chunks += self
                .store
                .index(&reconstruction.page, &reconstruction.image_refs)
                .await?;
        }
        self.store.record_content_hash(&filename, &content_hash).await?;

        metrics::counter!("factory_pages_ingested_total").increment(page_count as u64);

        info!(
            file = %filename,
            pages = page_count,
            chunks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Document ingested"
        );

        Ok(IngestOutcome {
            filename,
            pages: page_count,
            chunks,
            unchanged: false,
        })
    }

    /// Extract and reconstruct every page of a stored upload.
    async fn read_pages(
        &self,
        filename: &str,
        path: &Path,
        content: &[u8],
    ) -> ServiceResult<Vec<PageReconstruction>> {
        match extension_of(filename).as_str() {
            "pdf" => {
                let path = path.to_path_buf();
                let pages = tokio::task::spawn_blocking(move || pdf::read_pdf_pages(&path))
                    .await
                    .map_err(|e| ServiceError::Internal {
                        message: format!("PDF extraction task failed: {}", e),
                    })??;
                Ok(self.reconstructor.reconstruct_document(filename, pages))
            }
            ext if text::TEXT_EXTENSIONS.contains(&ext) => {
                let page = text::read_text_page(filename, content)?;
                Ok(vec![self.reconstructor.reconstruct_page(filename, &page)])
            }
            ext => Err(ProcessingError::UnsupportedFormat {
                format: ext.to_string(),
            }
            .into()),
        }
    }

    /// Drop the chunks and image assets of a document, keeping the stored upload.
    ///
    /// Images are removed by the refs the index recorded for this file, then by
    /// the file's asset prefix for pages that never reached the index.
    async fn remove_indexed(&self, filename: &str) -> ServiceResult<bool> {
        let recorded = self.store.delete_file(filename).await?;
        let existed = recorded.is_some();
        let mut images = self.images.delete_assets(&recorded.unwrap_or_default());
        images += self.images.delete_for_document(filename);
        if existed || images > 0 {
            debug!(file = %filename, images, "Removed previous index entries");
        }
        Ok(existed)
    }

    /// Delete a document from the knowledge base: chunks, image assets and the stored upload.
    pub async fn delete_document(&self, filename: &str) -> ServiceResult<()> {
        let filename = sanitize_upload_name(filename)?;

        if !self.remove_indexed(&filename).await? {
            return Err(ServiceError::FileNotFound { filename });
        }

        let path = self.upload_dir.join(&filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %filename, error = %e, "Failed to remove stored upload"),
        }

        info!(file = %filename, "Document deleted");
        Ok(())
    }
}
