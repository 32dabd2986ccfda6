//! Configuration struct definitions for each `AppConfig` section.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "super::defaults::default_host")]
    pub host: String,

    #[serde(default = "super::defaults::default_port")]
    pub port: u16,
}

/// Filesystem layout
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Holds the SQLite knowledge index
    #[serde(default = "super::defaults::default_data_dir")]
    pub data_dir: PathBuf,

    /// Uploaded source documents, stored verbatim and served at `/files`
    #[serde(default = "super::defaults::default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Page-addressed image assets, served at `/images`
    #[serde(default = "super::defaults::default_images_dir")]
    pub images_dir: PathBuf,

    #[serde(default = "super::defaults::default_escalation_log")]
    pub escalation_log: PathBuf,

    /// Base URL embedded in image markers, e.g. `http://localhost:8000`
    #[serde(default = "super::defaults::default_public_base_url")]
    pub public_base_url: String,
}

impl StorageConfig {
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    pub fn images_base_url(&self) -> String {
        format!("{}/images", self.public_base_url.trim_end_matches('/'))
    }
}

/// OpenAI-compatible chat model
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "super::defaults::default_model_url")]
    pub base_url: String,

    #[serde(default = "super::defaults::default_model_name")]
    pub model: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "super::defaults::default_temperature")]
    pub temperature: f32,

    #[serde(default = "super::defaults::default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "super::defaults::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "super::defaults::default_model_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ModelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Embedding model (Ollama-style `/api/embeddings`)
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "super::defaults::default_embeddings_url")]
    pub base_url: String,

    #[serde(default = "super::defaults::default_embedding_model")]
    pub model: String,

    /// Maximum characters per indexed chunk
    #[serde(default = "super::defaults::default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "super::defaults::default_embeddings_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Retrieval tool sizing
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched by vector similarity before reranking
    #[serde(default = "super::defaults::default_coarse_top_k")]
    pub coarse_top_k: usize,

    /// Chunks kept after reranking
    #[serde(default = "super::defaults::default_rerank_top_n")]
    pub rerank_top_n: usize,
}

/// Reranker service. Without `base_url` the coarse order is kept.
#[derive(Debug, Clone, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "super::defaults::default_reranker_model")]
    pub model: String,

    #[serde(default = "super::defaults::default_reranker_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Agent turn limits and language
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model calls in one user turn
    #[serde(default = "super::defaults::default_max_model_calls")]
    pub max_model_calls: u32,

    /// History kept per thread; older whole turns are dropped first
    #[serde(default = "super::defaults::default_max_history_messages")]
    pub max_history_messages: usize,

    /// Threads untouched for this long are forgotten
    #[serde(default = "super::defaults::default_idle_thread_secs")]
    pub idle_thread_secs: u64,

    /// Locale for user-facing and tool-facing text (`zh-CN` or `en`)
    #[serde(default = "super::defaults::default_locale")]
    pub locale: String,
}

/// Multimodal adapter settings
#[derive(Debug, Clone, Deserialize)]
pub struct MultimodalConfig {
    /// Send retrieved images to the model as inline image parts
    #[serde(default = "super::defaults::default_multimodal_enabled")]
    pub enabled: bool,

    /// Images smaller than this are treated as decorative and dropped
    #[serde(default = "super::defaults::default_min_image_bytes")]
    pub min_image_bytes: u64,
}

/// Speech-to-text service (OpenAI-compatible `/audio/transcriptions`)
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "super::defaults::default_voice_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "super::defaults::default_voice_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "super::defaults::default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}
