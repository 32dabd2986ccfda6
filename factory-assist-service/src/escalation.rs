//! Durable log of questions the knowledge base could not answer.
//!
//! The log is a single JSON array on disk. Every mutation reads the whole file,
//! changes it and atomically replaces it, all under one async lock, so
//! concurrent turns cannot lose each other's records.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::EscalationError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Pending,
    Solved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub query: String,
    pub reason: String,
    pub timestamp: String,
    pub status: EscalationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_source: Option<String>,
}

/// What [`EscalationLog::record`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A pending record with the same normalized query already exists
    Duplicate,
}

/// Dedup key: trimmed, whitespace collapsed, lowercased.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub struct EscalationLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EscalationLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Append a pending record unless an equivalent one is already pending.
    pub async fn record(&self, query: &str, reason: &str) -> Result<RecordOutcome, EscalationError> {
        let _guard = self.lock.lock().await;
        let mut records = read_records(&self.path)?;

        let key = normalize_query(query);
        let duplicate = records
            .iter()
            .any(|r| r.status == EscalationStatus::Pending && normalize_query(&r.query) == key);
        if duplicate {
            debug!(query = %query, "Question already pending");
            return Ok(RecordOutcome::Duplicate);
        }

        records.push(EscalationRecord {
            query: query.trim().to_string(),
            reason: reason.to_string(),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            status: EscalationStatus::Pending,
            solved_source: None,
        });
        write_records(&self.path, &records)?;

        metrics::counter!("factory_escalations_total").increment(1);
        info!(query = %query, reason = %reason, "Recorded unanswered question");
        Ok(RecordOutcome::Recorded)
    }

    /// Pending records, newest first
    pub async fn pending(&self) -> Result<Vec<EscalationRecord>, EscalationError> {
        let _guard = self.lock.lock().await;
        let records = read_records(&self.path)?;
        Ok(records
            .into_iter()
            .rev()
            .filter(|r| r.status == EscalationStatus::Pending)
            .collect())
    }

    /// Mark the pending record for `query` as solved by `source`.
    ///
    /// Returns `false` when no pending record matches.
    pub async fn mark_solved(&self, query: &str, source: &str) -> Result<bool, EscalationError> {
        let _guard = self.lock.lock().await;
        let mut records = read_records(&self.path)?;

        let key = normalize_query(query);
        let mut solved = false;
        for record in records
            .iter_mut()
            .filter(|r| r.status == EscalationStatus::Pending && normalize_query(&r.query) == key)
        {
            record.status = EscalationStatus::Solved;
            record.solved_source = Some(source.to_string());
            solved = true;
        }

        if solved {
            write_records(&self.path, &records)?;
            info!(query = %query, source = %source, "Question marked solved");
        }
        Ok(solved)
    }
}

fn read_records(path: &Path) -> Result<Vec<EscalationRecord>, EscalationError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn write_records(path: &Path, records: &[EscalationRecord]) -> Result<(), EscalationError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, records)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}
