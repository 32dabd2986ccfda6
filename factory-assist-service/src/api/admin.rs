//! Unanswered question administration.

use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::I18nError;
use crate::escalation::EscalationRecord;
use crate::service::SolveRequest;

use super::AppState;

#[derive(Serialize)]
pub struct UnansweredResponse {
    pub questions: Vec<EscalationRecord>,
}

#[derive(Serialize)]
pub struct SolveResponse {
    pub message: String,
    pub query: String,
    pub sources: Vec<String>,
    pub chunks: usize,
}

/// Pending questions, newest first
pub async fn unanswered_questions_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UnansweredResponse>, I18nError> {
    let questions = state
        .service
        .unanswered_questions()
        .await
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(UnansweredResponse { questions }))
}

/// Answer a pending question with text, a document, or both
pub async fn solve_question_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SolveResponse>, I18nError> {
    let mut request = SolveRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| state.multipart_error(e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| state.multipart_error(e))?;
                if !data.is_empty() {
                    request.file = Some((filename, data.to_vec()));
                }
            }
            "query" => {
                request.query = field.text().await.map_err(|e| state.multipart_error(e))?;
            }
            "answer_text" => {
                request.answer_text =
                    Some(field.text().await.map_err(|e| state.multipart_error(e))?);
            }
            "custom_filename" => {
                request.custom_filename =
                    Some(field.text().await.map_err(|e| state.multipart_error(e))?);
            }
            _ => {}
        }
    }

    let outcome = state
        .service
        .solve_question(request)
        .await
        .map_err(|e| state.i18n_error(e))?;

    Ok(Json(SolveResponse {
        message: state.text("kb-solve-success", &[]),
        query: outcome.query,
        sources: outcome.sources,
        chunks: outcome.chunks,
    }))
}
