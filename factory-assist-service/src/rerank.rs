//! Cross-encoder reranking.
//!
//! The HTTP client speaks the `/rerank` API shared by TEI, Xinference and
//! Jina-compatible servers. Without a configured server the
//! [`PassthroughReranker`] keeps the coarse similarity order.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::RerankerConfig;
use crate::error::{RerankError, ServiceError, ServiceResult};

/// One reranked document: its index in the input and its relevance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankHit {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score `documents` against `query` and return at most `top_n` hits,
    /// most relevant first.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError>;
}

/// Keeps the input order
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError> {
        Ok((0..documents.len().min(top_n))
            .map(|index| RerankHit { index, score: 0.0 })
            .collect())
    }
}

pub struct HttpReranker {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    pub fn new(base_url: &str, config: &RerankerConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build reranker HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RerankRequest {
                model: &self.model,
                query,
                documents,
                top_n,
            })
            .send()
            .await
            .map_err(|e| RerankError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RerankError::Status { status, message });
        }

        let body: RerankResponse =
            response
                .json()
                .await
                .map_err(|e| RerankError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let hits = sanitize_hits(body.results, documents.len(), top_n)?;
        debug!(candidates = documents.len(), kept = hits.len(), "Reranked candidates");
        Ok(hits)
    }
}

/// Order by score, validate indices and cap at `top_n`.
fn sanitize_hits(
    results: Vec<RerankResult>,
    document_count: usize,
    top_n: usize,
) -> Result<Vec<RerankHit>, RerankError> {
    let mut hits = Vec::with_capacity(results.len());
    for result in results {
        if result.index >= document_count {
            return Err(RerankError::InvalidResponse {
                message: format!(
                    "index {} out of range for {} documents",
                    result.index, document_count
                ),
            });
        }
        if hits.iter().any(|h: &RerankHit| h.index == result.index) {
            continue;
        }
        hits.push(RerankHit {
            index: result.index,
            score: result.relevance_score,
        });
    }
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_n);
    Ok(hits)
}
