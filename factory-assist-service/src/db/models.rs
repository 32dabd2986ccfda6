//! Row types for the knowledge index.

use serde::Serialize;

/// A chunk ready to be written
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub image_refs: Vec<String>,
    pub embedding: Vec<f32>,
}

/// A chunk read back from the index
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub file_name: String,
    pub page_label: Option<String>,
    pub content: String,
    pub image_refs: Vec<String>,
}

impl StoredChunk {
    pub(super) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let image_refs_json: String = row.get("image_refs")?;
        Ok(Self {
            file_name: row.get("file_name")?,
            page_label: row.get("page_label")?,
            content: row.get("content")?,
            image_refs: serde_json::from_str(&image_refs_json).unwrap_or_default(),
        })
    }
}

/// Indexed file with its chunk count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub chunks: u64,
}
