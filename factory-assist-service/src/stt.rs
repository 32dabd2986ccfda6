//! Speech-to-text for voice questions.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::VoiceConfig;
use crate::error::{ServiceError, ServiceResult, TranscriptionError};

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one recording. `filename` carries the container format
    /// (`question.webm`) for servers that sniff by extension.
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, TranscriptionError>;
}

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint
pub struct HttpTranscriber {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl HttpTranscriber {
    pub fn new(base_url: &str, config: &VoiceConfig) -> ServiceResult<Self> {
        info!(model = %config.model, url = %base_url, "Initializing transcription client");

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build transcription HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, TranscriptionError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let size = audio.len();

        let form = Form::new()
            .part("file", Part::bytes(audio).file_name(filename.to_string()))
            .text("model", self.model.clone());

        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Status { status, message });
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|source| TranscriptionError::InvalidResponse { source })?;

        debug!(bytes = size, chars = body.text.chars().count(), "Transcribed audio");
        Ok(body.text.trim().to_string())
    }
}
