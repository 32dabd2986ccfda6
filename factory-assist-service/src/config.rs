//! Service configuration.
//!
//! Loaded once at startup from an optional `config.{toml,yaml,json}` file and
//! `FACTORY__*` environment variables, then shared as `Arc<AppConfig>` with
//! every component that needs it. Nothing reads configuration from globals.

mod defaults;
mod loader;
mod schemas;

use serde::Deserialize;

pub use loader::load_config;
pub use schemas::{
    AgentConfig, EmbeddingsConfig, LimitsConfig, ModelConfig, MultimodalConfig, RerankerConfig,
    RetrievalConfig, ServerConfig, StorageConfig, VoiceConfig,
};

use defaults::{
    default_agent, default_embeddings, default_limits, default_model, default_multimodal,
    default_reranker, default_retrieval, default_server, default_storage, default_voice,
};

/// Complete service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_model")]
    pub model: ModelConfig,

    #[serde(default = "default_embeddings")]
    pub embeddings: EmbeddingsConfig,

    #[serde(default = "default_retrieval")]
    pub retrieval: RetrievalConfig,

    #[serde(default = "default_reranker")]
    pub reranker: RerankerConfig,

    #[serde(default = "default_agent")]
    pub agent: AgentConfig,

    #[serde(default = "default_multimodal")]
    pub multimodal: MultimodalConfig,

    #[serde(default = "default_voice")]
    pub voice: VoiceConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            model: default_model(),
            embeddings: default_embeddings(),
            retrieval: default_retrieval(),
            reranker: default_reranker(),
            agent: default_agent(),
            multimodal: default_multimodal(),
            voice: default_voice(),
            limits: default_limits(),
        }
    }
}
