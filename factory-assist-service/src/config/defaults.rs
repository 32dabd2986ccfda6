//! Default value functions for `AppConfig`.

use std::path::PathBuf;

use super::schemas::{
    AgentConfig, EmbeddingsConfig, LimitsConfig, ModelConfig, MultimodalConfig, RerankerConfig,
    RetrievalConfig, ServerConfig, StorageConfig, VoiceConfig,
};

// ==================== Top-level Section Defaults ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
        upload_dir: default_upload_dir(),
        images_dir: default_images_dir(),
        escalation_log: default_escalation_log(),
        public_base_url: default_public_base_url(),
    }
}

pub(crate) fn default_model() -> ModelConfig {
    ModelConfig {
        base_url: default_model_url(),
        model: default_model_name(),
        api_key: String::new(),
        temperature: default_temperature(),
        max_tokens: default_max_tokens(),
        connect_timeout_secs: default_connect_timeout_secs(),
        request_timeout_secs: default_model_timeout_secs(),
    }
}

pub(crate) fn default_embeddings() -> EmbeddingsConfig {
    EmbeddingsConfig {
        base_url: default_embeddings_url(),
        model: default_embedding_model(),
        chunk_size: default_chunk_size(),
        request_timeout_secs: default_embeddings_timeout_secs(),
    }
}

pub(crate) fn default_retrieval() -> RetrievalConfig {
    RetrievalConfig {
        coarse_top_k: default_coarse_top_k(),
        rerank_top_n: default_rerank_top_n(),
    }
}

pub(crate) fn default_reranker() -> RerankerConfig {
    RerankerConfig {
        base_url: None,
        model: default_reranker_model(),
        request_timeout_secs: default_reranker_timeout_secs(),
    }
}

pub(crate) fn default_agent() -> AgentConfig {
    AgentConfig {
        max_model_calls: default_max_model_calls(),
        max_history_messages: default_max_history_messages(),
        idle_thread_secs: default_idle_thread_secs(),
        locale: default_locale(),
    }
}

pub(crate) fn default_multimodal() -> MultimodalConfig {
    MultimodalConfig {
        enabled: default_multimodal_enabled(),
        min_image_bytes: default_min_image_bytes(),
    }
}

pub(crate) fn default_voice() -> VoiceConfig {
    VoiceConfig {
        base_url: None,
        model: default_voice_model(),
        api_key: None,
        request_timeout_secs: default_voice_timeout_secs(),
    }
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_bytes: default_max_upload_bytes(),
    }
}

// ==================== Server / Storage ====================

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8000
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_upload_dir() -> PathBuf {
    PathBuf::from("./factory_docs")
}

pub(crate) fn default_images_dir() -> PathBuf {
    PathBuf::from("./factory_images")
}

pub(crate) fn default_escalation_log() -> PathBuf {
    PathBuf::from("./data/unanswered_questions.json")
}

pub(crate) fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

// ==================== Model Services ====================

pub(crate) fn default_model_url() -> String {
    "https://api.deepseek.com".to_string()
}

pub(crate) fn default_model_name() -> String {
    "deepseek-chat".to_string()
}

pub(crate) fn default_temperature() -> f32 {
    0.1
}

pub(crate) fn default_max_tokens() -> u32 {
    1024
}

pub(crate) fn default_connect_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_model_timeout_secs() -> u64 {
    120
}

pub(crate) fn default_embeddings_url() -> String {
    "http://localhost:11434".to_string()
}

pub(crate) fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

pub(crate) fn default_chunk_size() -> usize {
    512
}

pub(crate) fn default_embeddings_timeout_secs() -> u64 {
    60
}

pub(crate) fn default_reranker_model() -> String {
    "BAAI/bge-reranker-base".to_string()
}

pub(crate) fn default_reranker_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_voice_model() -> String {
    "whisper-1".to_string()
}

pub(crate) fn default_voice_timeout_secs() -> u64 {
    60
}

// ==================== Retrieval / Agent ====================

pub(crate) fn default_coarse_top_k() -> usize {
    15
}

pub(crate) fn default_rerank_top_n() -> usize {
    5
}

pub(crate) fn default_max_model_calls() -> u32 {
    4
}

pub(crate) fn default_max_history_messages() -> usize {
    40
}

pub(crate) fn default_idle_thread_secs() -> u64 {
    3600
}

pub(crate) fn default_locale() -> String {
    "zh-CN".to_string()
}

pub(crate) fn default_multimodal_enabled() -> bool {
    true
}

pub(crate) fn default_min_image_bytes() -> u64 {
    1500
}

pub(crate) fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}
