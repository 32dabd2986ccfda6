//! Database schema setup.

use rusqlite::Connection;

use crate::error::{ServiceResult, StoreError};

/// Create the schema if it does not exist yet.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        -- One row per ingested source file
        CREATE TABLE IF NOT EXISTS files (
            name TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Indexed chunks of reconstructed pages
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            page_label TEXT,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            has_images INTEGER NOT NULL DEFAULT 0,
            image_refs TEXT NOT NULL DEFAULT '[]',
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_file_name ON chunks(file_name);
        "#,
    )
    .map_err(StoreError::Query)?;

    Ok(())
}
