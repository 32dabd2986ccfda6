//! OpenAI-compatible `/chat/completions` client.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::sse::parse_sse_stream;
use super::wire::{ChatCompletionRequest, WireTool, wire_messages};
use super::{ChatModel, ModelRequest, ModelStream};
use crate::config::ModelConfig;
use crate::error::{ModelError, ServiceError, ServiceResult};

pub struct OpenAiChatModel {
    client: Client,
    config: ModelConfig,
}

impl OpenAiChatModel {
    pub fn new(config: ModelConfig) -> ServiceResult<Self> {
        info!(model = %config.model, url = %config.base_url, "Initializing chat model client");

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build model HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let url = self.endpoint();
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: wire_messages(&request.system, &request.messages),
            tools: request.tools.iter().map(WireTool::function).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        debug!(
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat completion request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await.map_err(|e| ModelError::Connection {
            url: url.clone(),
            source: e,
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Generation { status, message });
        }

        Ok(Box::pin(parse_sse_stream(response.bytes_stream())))
    }
}
