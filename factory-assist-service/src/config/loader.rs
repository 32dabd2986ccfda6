//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::AppConfig;

/// Load configuration from `config.*` in the working directory and `FACTORY__*` env vars
pub fn load_config() -> ServiceResult<AppConfig> {
    Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("FACTORY")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}

/// Load configuration from an inline TOML document
#[cfg(test)]
fn load_config_from_str(toml: &str) -> ServiceResult<AppConfig> {
    Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.retrieval.coarse_top_k, 15);
        assert_eq!(config.retrieval.rerank_top_n, 5);
        assert_eq!(config.multimodal.min_image_bytes, 1500);
        assert_eq!(config.agent.locale, "zh-CN");
        assert_eq!(config.agent.max_history_messages, 40);
        assert_eq!(config.agent.idle_thread_secs, 3600);
        assert!(config.reranker.base_url.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = load_config_from_str(
            r#"
            [retrieval]
            rerank_top_n = 3

            [storage]
            public_base_url = "http://factory.local:8000/"
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.rerank_top_n, 3);
        assert_eq!(config.retrieval.coarse_top_k, 15);
        assert_eq!(
            config.storage.images_base_url(),
            "http://factory.local:8000/images"
        );
        assert_eq!(config.embeddings.chunk_size, 512);
    }
}
