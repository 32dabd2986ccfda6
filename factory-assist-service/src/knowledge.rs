//! Knowledge store adapter.
//!
//! The [`KnowledgeStore`] trait is the narrow contract the rest of the service
//! uses for indexing and similarity search; [`SqliteKnowledgeStore`] implements
//! it over the local SQLite index and an [`Embedder`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::db::{Database, FileSummary, NewChunk};
use crate::embeddings::Embedder;
use crate::error::ServiceResult;
use crate::ingestion::chunking::split_content;
use crate::ingestion::reconstruct::ReconstructedPage;

/// A chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub source_file: String,
    /// Page label as stored; may be missing or non-numeric
    pub page_label: Option<String>,
    pub text: String,
    /// Asset names referenced by markers in `text`, in order
    pub image_refs: Vec<String>,
    pub score: f32,
}

impl RetrievedChunk {
    /// Numeric page for ordering; missing or non-numeric labels count as 0
    pub fn page_number(&self) -> u32 {
        self.page_label
            .as_deref()
            .and_then(|label| label.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Index one reconstructed page. Returns the number of chunks written.
    async fn index(&self, page: &ReconstructedPage, image_refs: &[String]) -> ServiceResult<usize>;

    /// Top `k` chunks by vector similarity to `text`, most similar first
    async fn query_similar(&self, text: &str, k: usize) -> ServiceResult<Vec<RetrievedChunk>>;

    async fn list_files(&self) -> ServiceResult<Vec<FileSummary>>;

    /// Remove every chunk of `name`. Returns the image refs those chunks
    /// recorded, or `None` if the file was not indexed.
    async fn delete_file(&self, name: &str) -> ServiceResult<Option<Vec<String>>>;

    /// Content hash recorded when `name` was last ingested
    async fn content_hash(&self, name: &str) -> ServiceResult<Option<String>>;

    async fn record_content_hash(&self, name: &str, hash: &str) -> ServiceResult<()>;
}

/// SQLite-backed store with brute-force cosine search
pub struct SqliteKnowledgeStore {
    db: Arc<Database>,
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
}

impl SqliteKnowledgeStore {
    pub fn new(db: Arc<Database>, embedder: Arc<dyn Embedder>, chunk_size: usize) -> Self {
        Self {
            db,
            embedder,
            chunk_size,
        }
    }
}

/// Asset names from `image_refs` that occur in `chunk`, in order of appearance
fn refs_in_chunk(chunk: &str, image_refs: &[String]) -> Vec<String> {
    let mut found: Vec<(usize, &String)> = image_refs
        .iter()
        .filter_map(|r| chunk.find(r.as_str()).map(|pos| (pos, r)))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, r)| r.clone()).collect()
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn index(&self, page: &ReconstructedPage, image_refs: &[String]) -> ServiceResult<usize> {
        let pieces = split_content(&page.ordered_content, self.chunk_size);
        let mut chunks = Vec::with_capacity(pieces.len());

        for content in pieces {
            let embedding = self.embedder.embed(&content).await?;
            chunks.push(NewChunk {
                image_refs: refs_in_chunk(&content, image_refs),
                content,
                embedding,
            });
        }

        let page_label = page.page_number.to_string();
        let written = self.db.insert_page_chunks(
            &page.source_file,
            Some(&page_label),
            page.has_images,
            &chunks,
        )?;

        debug!(
            file = %page.source_file,
            page = page.page_number,
            chunks = written,
            "Indexed page"
        );
        Ok(written)
    }

    async fn query_similar(&self, text: &str, k: usize) -> ServiceResult<Vec<RetrievedChunk>> {
        let query_embedding = self.embedder.embed(text).await?;
        let results = self.db.search_chunks(&query_embedding, k)?;

        Ok(results
            .into_iter()
            .map(|(chunk, score)| RetrievedChunk {
                source_file: chunk.file_name,
                page_label: chunk.page_label,
                text: chunk.content,
                image_refs: chunk.image_refs,
                score,
            })
            .collect())
    }

    async fn list_files(&self) -> ServiceResult<Vec<FileSummary>> {
        self.db.list_files()
    }

    async fn delete_file(&self, name: &str) -> ServiceResult<Option<Vec<String>>> {
        self.db.delete_file(name)
    }

    async fn content_hash(&self, name: &str) -> ServiceResult<Option<String>> {
        self.db.file_hash(name)
    }

    async fn record_content_hash(&self, name: &str, hash: &str) -> ServiceResult<()> {
        self.db.upsert_file(name, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::KeywordEmbedder;

    fn page(file: &str, number: u32, content: &str) -> ReconstructedPage {
        ReconstructedPage {
            source_file: file.to_string(),
            page_number: number,
            ordered_content: content.to_string(),
            has_images: content.contains("!["),
        }
    }

    fn store(chunk_size: usize) -> SqliteKnowledgeStore {
        SqliteKnowledgeStore::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(KeywordEmbedder::new(&["pump", "valve", "motor"])),
            chunk_size,
        )
    }

    #[test]
    fn test_page_number_parsing() {
        let mut chunk = RetrievedChunk {
            source_file: "m1.pdf".to_string(),
            page_label: Some(" 12 ".to_string()),
            text: String::new(),
            image_refs: vec![],
            score: 0.0,
        };
        assert_eq!(chunk.page_number(), 12);
        chunk.page_label = Some("iv".to_string());
        assert_eq!(chunk.page_number(), 0);
        chunk.page_label = None;
        assert_eq!(chunk.page_number(), 0);
    }

    #[test]
    fn test_refs_in_chunk_keeps_content_order() {
        let refs = vec!["a_p1_0.png".to_string(), "a_p1_1.png".to_string()];
        let chunk = "![d](http://h/images/a_p1_1.png)\n\ntext\n\n![d](http://h/images/a_p1_0.png)";
        assert_eq!(refs_in_chunk(chunk, &refs), vec!["a_p1_1.png", "a_p1_0.png"]);
        assert!(refs_in_chunk("no images", &refs).is_empty());
    }

    #[tokio::test]
    async fn test_index_then_query() {
        let store = store(512);
        store
            .index(&page("pumps.pdf", 3, "Check the pump seal"), &[])
            .await
            .unwrap();
        store
            .index(&page("motors.pdf", 1, "Motor overheating"), &[])
            .await
            .unwrap();

        let results = store.query_similar("pump leaking", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_file, "pumps.pdf");
        assert_eq!(results[0].page_number(), 3);
    }

    #[tokio::test]
    async fn test_index_splits_large_pages_and_tracks_images() {
        let store = store(40);
        let content = "valve step one is long enough\n\n![diagram](http://h/images/v_p1_0.png)\n\nvalve step two";
        let written = store
            .index(&page("v.pdf", 1, content), &["v_p1_0.png".to_string()])
            .await
            .unwrap();
        assert!(written >= 2);

        let files = store.list_files().await.unwrap();
        assert_eq!(files[0].chunks as usize, written);

        let results = store.query_similar("valve", 10).await.unwrap();
        let with_image: Vec<_> = results.iter().filter(|c| !c.image_refs.is_empty()).collect();
        assert_eq!(with_image.len(), 1);
        assert_eq!(with_image[0].image_refs, vec!["v_p1_0.png"]);
    }

    #[tokio::test]
    async fn test_delete_file() {
        let store = store(512);
        store.index(&page("m1.pdf", 1, "pump"), &[]).await.unwrap();
        assert_eq!(store.delete_file("m1.pdf").await.unwrap(), Some(vec![]));
        assert_eq!(store.delete_file("m1.pdf").await.unwrap(), None);
        assert!(store.list_files().await.unwrap().is_empty());
    }
}
