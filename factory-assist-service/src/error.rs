use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::i18n::I18n;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("File not found in knowledge base: {filename}")]
    FileNotFound { filename: String },

    #[error("No pending question matches: {query}")]
    QuestionNotFound { query: String },

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("Knowledge store error")]
    Store(#[from] StoreError),

    #[error("Document processing failed")]
    Processing(#[from] ProcessingError),

    #[error("Embedding error")]
    Embedding(#[from] EmbeddingError),

    #[error("Rerank error")]
    Rerank(#[from] RerankError),

    #[error("Escalation log error")]
    Escalation(#[from] EscalationError),

    #[error("{0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Chat model client errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Connection failed to model service at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from model service")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Model stream interrupted: {message}")]
    Stream { message: String },
}

/// Knowledge store (SQLite) errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Serialization failed")]
    Serialization(#[source] serde_json::Error),

    #[error("Database connection lock poisoned")]
    Poisoned,
}

/// Document processing errors
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to load PDF: {message}")]
    PdfLoad { message: String },

    #[error("Failed to extract content from page {page}")]
    PageExtraction {
        page: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: String },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File is not valid UTF-8 text: {filename}")]
    InvalidText { filename: String },

    #[error("Image encoding failed")]
    ImageEncode(#[source] image::ImageError),

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// Embedding errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Connection failed to embedding service at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Embedding model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Embedding generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid embedding response: {message}")]
    InvalidResponse { message: String },
}

/// Reranker errors
#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Connection failed to reranker at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Rerank failed (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid rerank response: {message}")]
    InvalidResponse { message: String },
}

/// Escalation log persistence errors
#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("Escalation log IO failed")]
    Io(#[from] std::io::Error),

    #[error("Escalation log is not valid JSON")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to replace escalation log")]
    Persist(#[from] tempfile::PersistError),
}

/// Speech-to-text errors
#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Voice transcription is not configured")]
    NotConfigured,

    #[error("Connection failed to transcription service at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Transcription failed (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid transcription response")]
    InvalidResponse {
        #[source]
        source: reqwest::Error,
    },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::FileNotFound { .. } | ServiceError::QuestionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ServiceError::Processing(ProcessingError::InvalidText { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Transcription(TranscriptionError::NotConfigured) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Model(_)
            | ServiceError::Embedding(_)
            | ServiceError::Rerank(_)
            | ServiceError::Transcription(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::FileNotFound { .. } => "file_not_found",
            ServiceError::QuestionNotFound { .. } => "question_not_found",
            ServiceError::Model(ModelError::Connection { .. }) => "model_connection",
            ServiceError::Model(ModelError::Generation { .. }) => "model_generation",
            ServiceError::Model(ModelError::InvalidResponse { .. }) => "model_invalid_response",
            ServiceError::Model(ModelError::Stream { .. }) => "model_stream",
            ServiceError::Store(_) => "store_error",
            ServiceError::Processing(ProcessingError::PdfLoad { .. }) => "pdf_load_error",
            ServiceError::Processing(ProcessingError::PageExtraction { .. }) => {
                "page_extraction_error"
            }
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                "unsupported_format"
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => "file_too_large",
            ServiceError::Processing(ProcessingError::InvalidText { .. }) => "invalid_text",
            ServiceError::Processing(ProcessingError::ImageEncode(_)) => "image_encode_error",
            ServiceError::Processing(ProcessingError::Io(_)) => "io_error",
            ServiceError::Embedding(_) => "embedding_error",
            ServiceError::Rerank(_) => "rerank_error",
            ServiceError::Escalation(_) => "escalation_log_error",
            ServiceError::Transcription(TranscriptionError::NotConfigured) => {
                "voice_not_configured"
            }
            ServiceError::Transcription(_) => "transcription_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// Get a user-friendly translated message
    pub fn user_message(&self, i18n: &I18n, locale: &str) -> String {
        match self {
            ServiceError::FileNotFound { filename } => {
                i18n.format(locale, "error-file-not-found", &[("name", filename)])
            }
            ServiceError::QuestionNotFound { query } => {
                i18n.format(locale, "error-question-not-found", &[("query", query)])
            }
            ServiceError::Processing(ProcessingError::UnsupportedFormat { format }) => {
                i18n.format(locale, "error-unsupported-format", &[("format", format)])
            }
            ServiceError::Transcription(TranscriptionError::NotConfigured) => {
                i18n.get(locale, "error-voice-not-configured", None)
            }
            ServiceError::Internal { .. } => i18n.get(locale, "error-internal", None),
            // For other errors, fall back to the technical message
            _ => describe(self),
        }
    }

    /// Convert to an error response with i18n support
    pub fn into_response_with_i18n(self, i18n: &I18n, locale: &str) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();
        let message = self.user_message(i18n, locale);

        let response = ErrorResponse {
            message,
            code: Some(code),
            details: None,
        };

        (status, Json(response)).into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: describe(&self),
            code: Some(code),
            details: None,
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and its whole `source()` chain on one line.
pub fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Error wrapper with i18n support for API responses
pub struct I18nError {
    pub error: ServiceError,
    pub i18n: std::sync::Arc<I18n>,
    pub locale: String,
}

impl I18nError {
    pub fn new(error: ServiceError, i18n: std::sync::Arc<I18n>, locale: impl Into<String>) -> Self {
        Self {
            error,
            i18n,
            locale: locale.into(),
        }
    }
}

impl IntoResponse for I18nError {
    fn into_response(self) -> Response {
        self.error.into_response_with_i18n(&self.i18n, &self.locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_includes_source_chain() {
        let err = ServiceError::Processing(ProcessingError::Io(std::io::Error::other(
            "disk unplugged",
        )));
        assert_eq!(
            describe(&err),
            "Document processing failed: IO error: disk unplugged"
        );
    }

    #[test]
    fn test_status_codes() {
        let err = ServiceError::Processing(ProcessingError::FileTooLarge { size: 10, max: 5 });
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = ServiceError::FileNotFound {
            filename: "m1.pdf".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "file_not_found");

        let err = ServiceError::Transcription(TranscriptionError::NotConfigured);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
