//! Service wiring.
//!
//! [`AssistantService`] builds every component from the loaded configuration
//! and exposes the operations the HTTP layer calls.

use std::sync::Arc;
use std::time::Instant;

use futures::Stream;
use serde::Serialize;
use tracing::{info, warn};

use crate::agent::{MultimodalAdapter, Orchestrator};
use crate::config::AppConfig;
use crate::db::{Database, FileSummary};
use crate::embeddings::OllamaEmbedder;
use crate::error::{ServiceError, ServiceResult, TranscriptionError, describe};
use crate::escalation::{EscalationLog, EscalationRecord};
use crate::i18n::I18n;
use crate::ingestion::assets::ImageStore;
use crate::ingestion::{IngestOutcome, IngestionService, sanitize_upload_name};
use crate::knowledge::{KnowledgeStore, SqliteKnowledgeStore};
use crate::llm::{ChatModel, OpenAiChatModel};
use crate::rerank::{HttpReranker, PassthroughReranker, Reranker};
use crate::stt::{HttpTranscriber, Transcriber};
use crate::tools::RetrievalTool;

/// External collaborators the service is built around
pub struct Backends {
    pub store: Arc<dyn KnowledgeStore>,
    pub model: Arc<dyn ChatModel>,
    pub reranker: Arc<dyn Reranker>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl Backends {
    /// Production backends as configured
    pub fn from_config(config: &AppConfig) -> ServiceResult<Self> {
        let db = Arc::new(Database::open(&config.storage.index_path())?);
        let embedder = Arc::new(OllamaEmbedder::new(&config.embeddings)?);
        let store = Arc::new(SqliteKnowledgeStore::new(
            db,
            embedder,
            config.embeddings.chunk_size,
        ));

        let model = Arc::new(OpenAiChatModel::new(config.model.clone())?);

        let reranker: Arc<dyn Reranker> = match &config.reranker.base_url {
            Some(url) => Arc::new(HttpReranker::new(url, &config.reranker)?),
            None => {
                info!("No reranker configured, keeping similarity order");
                Arc::new(PassthroughReranker)
            }
        };

        let transcriber: Option<Arc<dyn Transcriber>> = match &config.voice.base_url {
            Some(url) => Some(Arc::new(HttpTranscriber::new(url, &config.voice)?)),
            None => None,
        };

        Ok(Self {
            store,
            model,
            reranker,
            transcriber,
        })
    }
}

/// An administrator's answer to a pending question
#[derive(Debug, Default)]
pub struct SolveRequest {
    pub query: String,
    pub answer_text: Option<String>,
    pub custom_filename: Option<String>,
    /// Uploaded answer document: (file name, bytes)
    pub file: Option<(String, Vec<u8>)>,
}

#[derive(Debug, Serialize)]
pub struct SolveOutcome {
    pub query: String,
    /// Knowledge base files the answer was ingested as
    pub sources: Vec<String>,
    pub chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub indexed_files: usize,
}

/// Main service coordinator
pub struct AssistantService {
    pub config: Arc<AppConfig>,
    pub i18n: Arc<I18n>,
    pub store: Arc<dyn KnowledgeStore>,
    pub ingestion: Arc<IngestionService>,
    pub escalation: Arc<EscalationLog>,
    pub orchestrator: Arc<Orchestrator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    started_at: Instant,
}

impl AssistantService {
    pub fn new(config: Arc<AppConfig>) -> ServiceResult<Self> {
        info!("Initializing factory assistant service");
        let backends = Backends::from_config(&config)?;
        Ok(Self::with_backends(config, backends))
    }

    pub fn with_backends(config: Arc<AppConfig>, backends: Backends) -> Self {
        let locale = config.agent.locale.clone();
        let i18n = Arc::new(I18n::new(&locale));

        let images = Arc::new(ImageStore::new(
            config.storage.images_dir.clone(),
            config.storage.images_base_url(),
        ));
        let ingestion = Arc::new(IngestionService::new(
            backends.store.clone(),
            images.clone(),
            config.storage.upload_dir.clone(),
            config.limits.max_upload_bytes,
        ));
        let escalation = Arc::new(EscalationLog::new(config.storage.escalation_log.clone()));

        let retrieval = Arc::new(RetrievalTool::new(
            backends.store.clone(),
            backends.reranker,
            i18n.clone(),
            locale.clone(),
            config.retrieval.clone(),
        ));
        let adapter = MultimodalAdapter::new(
            images,
            config.multimodal.clone(),
            i18n.clone(),
            locale,
        );
        let orchestrator = Arc::new(Orchestrator::new(
            backends.model,
            retrieval,
            escalation.clone(),
            adapter,
            i18n.clone(),
            config.agent.clone(),
        ));

        Self {
            config,
            i18n,
            store: backends.store,
            ingestion,
            escalation,
            orchestrator,
            transcriber: backends.transcriber,
            started_at: Instant::now(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.config.agent.locale
    }

    /// Localized message for `key`
    pub fn text(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.i18n.format(self.locale(), key, args)
    }

    /// Answer a question as a stream of text increments
    pub fn chat(&self, thread_id: &str, query: &str) -> impl Stream<Item = String> + Send + use<> {
        self.orchestrator.chat(thread_id, query)
    }

    pub async fn upload(&self, filename: &str, content: &[u8]) -> ServiceResult<IngestOutcome> {
        self.ingestion.ingest_upload(filename, content).await
    }

    pub async fn list_files(&self) -> ServiceResult<Vec<FileSummary>> {
        self.store.list_files().await
    }

    pub async fn delete_file(&self, filename: &str) -> ServiceResult<()> {
        self.ingestion.delete_document(filename).await
    }

    /// Pending escalations, newest first
    pub async fn unanswered_questions(&self) -> ServiceResult<Vec<EscalationRecord>> {
        Ok(self.escalation.pending().await?)
    }

    /// Ingest an administrator's answer and close the pending question.
    pub async fn solve_question(&self, request: SolveRequest) -> ServiceResult<SolveOutcome> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "query is required".to_string(),
            });
        }

        let answer_text = request
            .answer_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        if answer_text.is_none() && request.file.is_none() {
            return Err(ServiceError::InvalidRequest {
                message: "answer_text or file is required".to_string(),
            });
        }

        let key = crate::escalation::normalize_query(&query);
        let pending = self.escalation.pending().await?;
        if !pending
            .iter()
            .any(|r| crate::escalation::normalize_query(&r.query) == key)
        {
            return Err(ServiceError::QuestionNotFound { query });
        }

        let mut sources = Vec::new();
        let mut chunks = 0;

        if let Some(answer) = answer_text {
            let filename = solution_filename(request.custom_filename.as_deref())?;
            let content = format!(
                "{}\n\n{}\n",
                self.text("kb-solution-question", &[("query", &query)]),
                self.text("kb-solution-answer", &[("answer", answer)]),
            );
            let outcome = self.ingestion.ingest_upload(&filename, content.as_bytes()).await?;
            chunks += outcome.chunks;
            sources.push(outcome.filename);
        }

        if let Some((filename, bytes)) = &request.file {
            let outcome = self.ingestion.ingest_upload(filename, bytes).await?;
            chunks += outcome.chunks;
            sources.push(outcome.filename);
        }

        let solved = self.escalation.mark_solved(&query, &sources.join(", ")).await?;
        if !solved {
            // Solved concurrently by another request; the answer stays ingested
            warn!(query = %query, "Question was no longer pending after ingesting the answer");
        }

        info!(query = %query, sources = ?sources, chunks, "Question solved");
        Ok(SolveOutcome {
            query,
            sources,
            chunks,
        })
    }

    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> ServiceResult<String> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or(TranscriptionError::NotConfigured)?;
        Ok(transcriber.transcribe(audio, filename).await?)
    }

    pub async fn health(&self) -> HealthReport {
        let (status, indexed_files) = match self.store.list_files().await {
            Ok(files) => (self.text("health-status-healthy", &[]), files.len()),
            Err(e) => {
                warn!(error = %describe(&e), "Knowledge store unavailable");
                (
                    self.text("health-status-degraded", &[("reason", &describe(&e))]),
                    0,
                )
            }
        };

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            indexed_files,
        }
    }
}

/// File name for a text answer: the administrator's choice, or a timestamped default.
fn solution_filename(custom: Option<&str>) -> ServiceResult<String> {
    match custom.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => {
            let name = sanitize_upload_name(name)?;
            if name.to_ascii_lowercase().ends_with(".txt") {
                Ok(name)
            } else {
                Ok(format!("{name}.txt"))
            }
        }
        None => Ok(format!(
            "solution_{}.txt",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::EscalationStatus;
    use crate::test_support::{ScriptedChatModel, test_service};

    fn service(dir: &tempfile::TempDir) -> AssistantService {
        test_service(dir, ScriptedChatModel::new(vec![]), None)
    }

    #[test]
    fn test_solution_filename() {
        assert_eq!(solution_filename(Some("e102_fix")).unwrap(), "e102_fix.txt");
        assert_eq!(solution_filename(Some("notes.TXT")).unwrap(), "notes.TXT");
        assert_eq!(solution_filename(Some("../x/fix")).unwrap(), "fix.txt");
        let generated = solution_filename(Some("  ")).unwrap();
        assert!(generated.starts_with("solution_") && generated.ends_with(".txt"));
    }

    #[tokio::test]
    async fn test_solve_with_text_ingests_and_marks_solved() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        service
            .escalation
            .record("Inverter alarm E-102", "not in manuals")
            .await
            .unwrap();

        let outcome = service
            .solve_question(SolveRequest {
                query: "inverter alarm  e-102".to_string(),
                answer_text: Some("Reset the inverter with key F3.".to_string()),
                custom_filename: Some("e102".to_string()),
                file: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.sources, vec!["e102.txt"]);
        assert!(outcome.chunks >= 1);

        let stored = std::fs::read_to_string(dir.path().join("uploads/e102.txt")).unwrap();
        assert!(stored.starts_with("Question: inverter alarm  e-102"));
        assert!(stored.contains("Answer: Reset the inverter with key F3."));

        assert!(service.unanswered_questions().await.unwrap().is_empty());
        let files = service.list_files().await.unwrap();
        assert_eq!(files[0].name, "e102.txt");

        let log = std::fs::read_to_string(dir.path().join("unanswered_questions.json")).unwrap();
        let records: Vec<EscalationRecord> = serde_json::from_str(&log).unwrap();
        assert_eq!(records[0].status, EscalationStatus::Solved);
        assert_eq!(records[0].solved_source.as_deref(), Some("e102.txt"));
    }

    #[tokio::test]
    async fn test_solve_unknown_question() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        let err = service
            .solve_question(SolveRequest {
                query: "never asked".to_string(),
                answer_text: Some("answer".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::QuestionNotFound { .. }));
        assert!(service.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_solve_requires_an_answer() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        service.escalation.record("Pump noise", "r").await.unwrap();

        let err = service
            .solve_question(SolveRequest {
                query: "Pump noise".to_string(),
                answer_text: Some("   ".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_transcribe_without_backend() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        let err = service.transcribe(vec![1, 2, 3], "q.webm").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Transcription(TranscriptionError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_health_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        service.upload("pump.txt", b"Pump seal check").await.unwrap();

        let health = service.health().await;
        assert_eq!(health.status, "Service is healthy");
        assert_eq!(health.indexed_files, 1);
    }
}
