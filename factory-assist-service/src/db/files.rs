//! Source file bookkeeping.

use rusqlite::{OptionalExtension, params};

use super::Database;
use crate::error::{ServiceResult, StoreError};

impl Database {
    /// Record (or replace) the content hash of an ingested file
    pub fn upsert_file(&self, name: &str, content_hash: &str) -> ServiceResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO files (name, content_hash) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET content_hash = excluded.content_hash,
                                            created_at = datetime('now')
            "#,
            params![name, content_hash],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    pub fn file_hash(&self, name: &str) -> ServiceResult<Option<String>> {
        let conn = self.conn()?;
        let hash = conn
            .query_row(
                "SELECT content_hash FROM files WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Query)?;
        Ok(hash)
    }

    /// Remove a file and all of its chunks.
    ///
    /// Returns the image refs the removed chunks recorded, or `None` if the
    /// file was not indexed.
    pub fn delete_file(&self, name: &str) -> ServiceResult<Option<Vec<String>>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StoreError::Query)?;

        let mut image_refs: Vec<String> = Vec::new();
        {
            let mut stmt = tx
                .prepare("SELECT image_refs FROM chunks WHERE file_name = ?1 ORDER BY rowid")
                .map_err(StoreError::Query)?;
            let rows = stmt
                .query_map(params![name], |row| row.get::<_, String>(0))
                .map_err(StoreError::Query)?;
            for row in rows {
                let json = row.map_err(StoreError::Query)?;
                let refs: Vec<String> =
                    serde_json::from_str(&json).map_err(StoreError::Serialization)?;
                for r in refs {
                    if !image_refs.contains(&r) {
                        image_refs.push(r);
                    }
                }
            }
        }

        let chunks = tx
            .execute("DELETE FROM chunks WHERE file_name = ?1", params![name])
            .map_err(StoreError::Query)?;
        let files = tx
            .execute("DELETE FROM files WHERE name = ?1", params![name])
            .map_err(StoreError::Query)?;
        tx.commit().map_err(StoreError::Query)?;

        Ok((chunks + files > 0).then_some(image_refs))
    }
}
