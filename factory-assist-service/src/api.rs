//! HTTP API for the factory assistant.
//!
//! - `POST /chat`: streamed answers
//! - `/knowledge/*`: knowledge base files
//! - `/admin/*`: unanswered questions
//! - `POST /voice`: speech to text
//! - health, metrics and the static `/images` and `/files` trees

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::{I18nError, ServiceError};
use crate::service::{AssistantService, HealthReport};

pub mod admin;
pub mod chat;
pub mod knowledge;
pub mod voice;

use admin::{solve_question_handler, unanswered_questions_handler};
use chat::chat_handler;
use knowledge::{delete_file_handler, list_files_handler, upload_file_handler};
use voice::voice_handler;

/// Room for multipart framing and form fields around an upload
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<AssistantService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create an i18n-aware error from a service error
    pub fn i18n_error(&self, error: ServiceError) -> I18nError {
        I18nError::new(error, self.service.i18n.clone(), self.service.locale())
    }

    pub fn multipart_error(&self, error: MultipartError) -> I18nError {
        self.i18n_error(ServiceError::InvalidRequest {
            message: error.body_text(),
        })
    }

    pub fn text(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.service.text(key, args)
    }
}

/// Build the API router
pub fn router(service: Arc<AssistantService>, metrics: Option<PrometheusHandle>) -> Router {
    let storage = service.config.storage.clone();
    let max_body_size = service.config.limits.max_upload_bytes as usize + MULTIPART_OVERHEAD_BYTES;

    let state = Arc::new(AppState { service, metrics });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = DefaultBodyLimit::max(max_body_size);

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/knowledge/files", get(list_files_handler))
        .route("/knowledge/files/{filename}", delete(delete_file_handler))
        .route(
            "/knowledge/upload",
            post(upload_file_handler).layer(upload_limit),
        )
        .route("/admin/unanswered_questions", get(unanswered_questions_handler))
        .route(
            "/admin/solve_question",
            post(solve_question_handler).layer(upload_limit),
        )
        .route("/voice", post(voice_handler).layer(upload_limit))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest_service("/images", ServeDir::new(storage.images_dir))
        .nest_service("/files", ServeDir::new(storage.upload_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.service.health().await)
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
