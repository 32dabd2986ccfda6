//! SQLite persistence for the knowledge index.
//!
//! This module provides the `Database` struct; operations are organized into
//! submodules by domain.

mod chunks;
mod files;
mod migrations;
pub mod models;

pub use models::{FileSummary, NewChunk};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{StoreError, ServiceResult};

/// Database manager for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> ServiceResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
            })?;
        }

        let conn = Connection::open(path).map_err(StoreError::Connection)?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Connection)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> ServiceResult<Self> {
        // WAL lets ingestion writes run alongside retrieval reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(StoreError::Query)?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lease the connection. It is released when the guard drops.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}
