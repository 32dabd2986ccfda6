//! Test doubles for the service's external boundaries.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::config::AppConfig;
use crate::db::{Database, FileSummary};
use crate::embeddings::Embedder;
use crate::error::{
    EmbeddingError, ModelError, RerankError, ServiceResult, StoreError, TranscriptionError,
};
use crate::ingestion::reconstruct::ReconstructedPage;
use crate::knowledge::{KnowledgeStore, RetrievedChunk, SqliteKnowledgeStore};
use crate::llm::{ChatModel, ModelEvent, ModelReply, ModelRequest, ModelStream, ToolCall};
use crate::rerank::{PassthroughReranker, RerankHit, Reranker};
use crate::service::{AssistantService, Backends};
use crate::stt::Transcriber;

/// Deterministic embedder: one dimension per keyword, counting occurrences,
/// plus a constant bias dimension so no vector is zero.
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        let mut vector: Vec<f32> = self
            .keywords
            .iter()
            .map(|keyword| text.matches(keyword.as_str()).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }
}

/// Knowledge store returning a fixed candidate list
pub struct StaticKnowledgeStore {
    chunks: Vec<RetrievedChunk>,
    fail: bool,
}

impl StaticKnowledgeStore {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self { chunks, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            chunks: vec![],
            fail: true,
        }
    }
}

#[async_trait]
impl KnowledgeStore for StaticKnowledgeStore {
    async fn index(&self, _page: &ReconstructedPage, _image_refs: &[String]) -> ServiceResult<usize> {
        Ok(0)
    }

    async fn query_similar(&self, _text: &str, k: usize) -> ServiceResult<Vec<RetrievedChunk>> {
        if self.fail {
            return Err(StoreError::Poisoned.into());
        }
        Ok(self.chunks.iter().take(k).cloned().collect())
    }

    async fn list_files(&self) -> ServiceResult<Vec<FileSummary>> {
        Ok(vec![])
    }

    async fn delete_file(&self, _name: &str) -> ServiceResult<Option<Vec<String>>> {
        Ok(None)
    }

    async fn content_hash(&self, _name: &str) -> ServiceResult<Option<String>> {
        Ok(None)
    }

    async fn record_content_hash(&self, _name: &str, _hash: &str) -> ServiceResult<()> {
        Ok(())
    }
}

/// Reranker returning fixed hits
pub struct ScriptedReranker {
    hits: Vec<RerankHit>,
}

impl ScriptedReranker {
    pub fn new(hits: Vec<RerankHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl Reranker for ScriptedReranker {
    async fn rerank(
        &self,
        _query: &str,
        _documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError> {
        Ok(self.hits.iter().take(top_n).copied().collect())
    }
}

pub struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn rerank(
        &self,
        _query: &str,
        _documents: &[String],
        _top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError> {
        Err(RerankError::Status {
            status: 503,
            message: "reranker offline".to_string(),
        })
    }
}

pub fn chunk(file: &str, page: Option<&str>, text: &str) -> RetrievedChunk {
    RetrievedChunk {
        source_file: file.to_string(),
        page_label: page.map(str::to_string),
        text: text.to_string(),
        image_refs: vec![],
        score: 0.5,
    }
}

/// One scripted model call
pub enum ScriptedStep {
    /// Stream these events
    Events(Vec<ModelEvent>),
    /// Fail before streaming
    Fail,
}

impl ScriptedStep {
    /// Stream `text` in two deltas, then finish with it
    pub fn answer(text: &str) -> Self {
        let split = text
            .char_indices()
            .nth(text.chars().count() / 2)
            .map(|(index, _)| index)
            .unwrap_or(0);
        let mut events = Vec::new();
        for part in [&text[..split], &text[split..]] {
            if !part.is_empty() {
                events.push(ModelEvent::Delta(part.to_string()));
            }
        }
        events.push(ModelEvent::Finished(ModelReply {
            content: text.to_string(),
            tool_calls: vec![],
        }));
        Self::Events(events)
    }

    /// A structured tool call with no text
    pub fn call(name: &str, arguments: serde_json::Value) -> Self {
        Self::calls(vec![(name, arguments)])
    }

    pub fn calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        let tool_calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments,
            })
            .collect();
        Self::Events(vec![ModelEvent::Finished(ModelReply {
            content: String::new(),
            tool_calls,
        })])
    }

    /// Text streamed in the given deltas, with no structured calls
    pub fn raw(deltas: &[&str]) -> Self {
        let mut events: Vec<ModelEvent> = deltas
            .iter()
            .map(|d| ModelEvent::Delta(d.to_string()))
            .collect();
        events.push(ModelEvent::Finished(ModelReply {
            content: deltas.concat(),
            tool_calls: vec![],
        }));
        Self::Events(events)
    }
}

/// Chat model replaying scripted steps and recording requests
#[derive(Default)]
pub struct ScriptedChatModel {
    steps: Mutex<VecDeque<ScriptedStep>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedChatModel {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ScriptedStep::Events(events)) => {
                Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
            }
            Some(ScriptedStep::Fail) => Err(ModelError::Generation {
                status: 500,
                message: "model unavailable".to_string(),
            }),
            None => Err(ModelError::Stream {
                message: "script exhausted".to_string(),
            }),
        }
    }
}

/// Transcriber returning fixed text
pub struct FixedTranscriber(pub String);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(
        &self,
        _audio: Vec<u8>,
        _filename: &str,
    ) -> Result<String, TranscriptionError> {
        Ok(self.0.clone())
    }
}

/// A service over an in-memory index with all files under `dir`
pub fn test_service(
    dir: &tempfile::TempDir,
    model: ScriptedChatModel,
    transcriber: Option<Arc<dyn Transcriber>>,
) -> AssistantService {
    let mut config = AppConfig::default();
    config.storage.data_dir = dir.path().join("data");
    config.storage.upload_dir = dir.path().join("uploads");
    config.storage.images_dir = dir.path().join("images");
    config.storage.escalation_log = dir.path().join("unanswered_questions.json");
    config.agent.locale = "en".to_string();

    let store = Arc::new(SqliteKnowledgeStore::new(
        Arc::new(Database::open_in_memory().unwrap()),
        Arc::new(KeywordEmbedder::new(&["pump", "valve", "inverter"])),
        512,
    ));
    AssistantService::with_backends(
        Arc::new(config),
        Backends {
            store,
            model: Arc::new(model),
            reranker: Arc::new(PassthroughReranker),
            transcriber,
        },
    )
}
