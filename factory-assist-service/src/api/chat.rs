//! Streaming chat endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::info;

use crate::error::{I18nError, ServiceError};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Conversation to continue; a new one is started when empty
    #[serde(default)]
    pub thread_id: String,
}

/// Answer a question as `text/event-stream` of raw text increments
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, I18nError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(state.i18n_error(ServiceError::InvalidRequest {
            message: "query must not be empty".to_string(),
        }));
    }

    let thread_id = match request.thread_id.trim() {
        "" => uuid::Uuid::new_v4().to_string(),
        id => id.to_string(),
    };
    info!(thread_id = %thread_id, "Chat request");

    let stream = state
        .service
        .chat(&thread_id, query)
        .map(Ok::<_, Infallible>);

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::super::router;
    use super::super::test_helpers::*;
    use crate::test_support::{ScriptedChatModel, ScriptedStep, test_service};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn chat_request(body: &str) -> Request<Body> {
        Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_chat_streams_answer() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedChatModel::new(vec![ScriptedStep::answer("检查冷却液液位。")]);
        let app = router(Arc::new(test_service(&dir, model, None)), None);

        let response = app
            .oneshot(chat_request(r#"{"query": "机床过热", "thread_id": "t1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
        assert_eq!(body_text(response).await, "检查冷却液液位。");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(
            Arc::new(test_service(&dir, ScriptedChatModel::new(vec![]), None)),
            None,
        );

        let response = app
            .oneshot(chat_request(r#"{"query": "  ", "thread_id": "t1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_request");
    }
}
