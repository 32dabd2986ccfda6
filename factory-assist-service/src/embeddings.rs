//! Text embeddings via Ollama's `/api/embeddings` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EmbeddingsConfig;
use crate::error::{EmbeddingError, ServiceError, ServiceResult};

/// Turns text into a dense vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Embedding client for an Ollama server
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingsConfig) -> ServiceResult<Self> {
        info!(model = %config.model, url = %config.base_url, "Initializing embedding client");

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build embedding HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model")
                && (message.contains("not found") || message.contains("does not exist"))
            {
                return Err(EmbeddingError::ModelNotFound {
                    model: self.model.clone(),
                });
            }

            return Err(EmbeddingError::Generation { status, message });
        }

        let body: OllamaEmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    message: e.to_string(),
                })?;

        if body.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse {
                message: "empty embedding".to_string(),
            });
        }

        debug!(dimensions = body.embedding.len(), "Embedded text");
        Ok(body.embedding)
    }
}
