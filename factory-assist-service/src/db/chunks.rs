//! Chunk storage and brute-force vector search.

use rusqlite::params;
use uuid::Uuid;

use super::Database;
use super::models::{FileSummary, NewChunk, StoredChunk};
use crate::error::{ServiceResult, StoreError};

impl Database {
    /// Insert the chunks of one page in a single transaction.
    pub fn insert_page_chunks(
        &self,
        file_name: &str,
        page_label: Option<&str>,
        has_images: bool,
        chunks: &[NewChunk],
    ) -> ServiceResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StoreError::Query)?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO chunks
                        (id, file_name, page_label, chunk_index, content, has_images, image_refs, embedding)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .map_err(StoreError::Query)?;

            for (index, chunk) in chunks.iter().enumerate() {
                let image_refs =
                    serde_json::to_string(&chunk.image_refs).map_err(StoreError::Serialization)?;
                let embedding_bytes: Vec<u8> = chunk
                    .embedding
                    .iter()
                    .flat_map(|f| f.to_le_bytes())
                    .collect();

                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    file_name,
                    page_label,
                    index as i64,
                    chunk.content,
                    has_images as i64,
                    image_refs,
                    embedding_bytes,
                ])
                .map_err(StoreError::Query)?;
            }
        }

        tx.commit().map_err(StoreError::Query)?;
        Ok(chunks.len())
    }

    /// Indexed files with their chunk counts, sorted by name
    pub fn list_files(&self) -> ServiceResult<Vec<FileSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT file_name, COUNT(*) FROM chunks GROUP BY file_name ORDER BY file_name",
            )
            .map_err(StoreError::Query)?;

        let files = stmt
            .query_map([], |row| {
                Ok(FileSummary {
                    name: row.get(0)?,
                    chunks: row.get::<_, i64>(1)? as u64,
                })
            })
            .map_err(StoreError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Query)?;

        Ok(files)
    }

    /// Top `limit` chunks by cosine similarity, most similar first.
    pub fn search_chunks(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> ServiceResult<Vec<(StoredChunk, f32)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT file_name, page_label, content, image_refs, embedding
                FROM chunks
                "#,
            )
            .map_err(StoreError::Query)?;

        let rows = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get("embedding")?;
                let chunk = StoredChunk::from_row(row)?;
                Ok((chunk, embedding_bytes))
            })
            .map_err(StoreError::Query)?;

        let mut results: Vec<(StoredChunk, f32)> = Vec::new();
        for row in rows {
            let (chunk, embedding_bytes) = row.map_err(StoreError::Query)?;

            let embedding: Vec<f32> = embedding_bytes
                .chunks_exact(4)
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect();

            let similarity = cosine_similarity(query_embedding, &embedding);
            results.push((chunk, similarity));
        }

        // Sort by similarity (descending)
        results.sort_by(|a, b| b.1.total_cmp(&a.1));
        results.truncate(limit);

        Ok(results)
    }
}

pub(super) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
