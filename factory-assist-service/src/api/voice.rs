//! Voice question transcription.

use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{I18nError, ServiceError};

use super::AppState;

#[derive(Serialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// Transcribe a recording (multipart field `file`)
pub async fn voice_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, I18nError> {
    let mut audio: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| state.multipart_error(e))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("voice.webm").to_string();
            let data = field.bytes().await.map_err(|e| state.multipart_error(e))?;
            audio = Some((data.to_vec(), filename));
        }
    }

    let (data, filename) = audio.filter(|(data, _)| !data.is_empty()).ok_or_else(|| {
        state.i18n_error(ServiceError::InvalidRequest {
            message: "No audio provided".to_string(),
        })
    })?;

    info!(bytes = data.len(), file = %filename, "Voice transcription request");
    let text = state
        .service
        .transcribe(data, &filename)
        .await
        .map_err(|e| state.i18n_error(e))?;

    Ok(Json(TranscriptionResponse { text }))
}
