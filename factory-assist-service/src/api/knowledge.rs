//! Knowledge base file endpoints.

use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::FileSummary;
use crate::error::{I18nError, ServiceError};

use super::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub chunks: usize,
    pub unchanged: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list_files_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FileSummary>>, I18nError> {
    let files = state
        .service
        .list_files()
        .await
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(files))
}

pub async fn delete_file_handler(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>, I18nError> {
    state
        .service
        .delete_file(&filename)
        .await
        .map_err(|e| state.i18n_error(e))?;

    Ok(Json(MessageResponse {
        message: state.text("kb-delete-success", &[("name", &filename)]),
    }))
}

/// Upload a document (multipart field `file`) and index it
pub async fn upload_file_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, I18nError> {
    let mut file_data: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| state.multipart_error(e))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|e| state.multipart_error(e))?;
            file_data = Some((data.to_vec(), filename));
        }
    }

    let (data, filename) = file_data.ok_or_else(|| {
        state.i18n_error(ServiceError::InvalidRequest {
            message: "No file provided".to_string(),
        })
    })?;

    let outcome = state
        .service
        .upload(&filename, &data)
        .await
        .map_err(|e| state.i18n_error(e))?;

    let message = if outcome.unchanged {
        state.text("kb-upload-unchanged", &[])
    } else {
        state.text("kb-upload-success", &[])
    };

    Ok(Json(UploadResponse {
        message,
        filename: outcome.filename,
        chunks: outcome.chunks,
        unchanged: outcome.unchanged,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::router;
    use super::super::test_helpers::*;
    use crate::test_support::{ScriptedChatModel, test_service};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(dir: &tempfile::TempDir) -> Router {
        router(
            Arc::new(test_service(dir, ScriptedChatModel::new(vec![]), None)),
            None,
        )
    }

    fn upload(filename: &str, content: &[u8]) -> Request<Body> {
        multipart_request(
            "/knowledge/upload",
            multipart_body(&[], &[("file", filename, content)]),
        )
    }

    #[tokio::test]
    async fn test_upload_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let response = app
            .clone()
            .oneshot(upload("pump.txt", b"Pump seal check\n\nValve reset"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Ingested successfully");
        assert_eq!(body["filename"], "pump.txt");
        assert_eq!(body["unchanged"], false);

        let response = app
            .clone()
            .oneshot(Request::get("/knowledge/files").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let files = body_json(response).await;
        assert_eq!(files[0]["name"], "pump.txt");
        assert!(files[0]["chunks"].as_u64().unwrap() >= 1);

        let response = app
            .clone()
            .oneshot(Request::get("/files/pump.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "Pump seal check\n\nValve reset");

        let response = app
            .clone()
            .oneshot(
                Request::delete("/knowledge/files/pump.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "pump.txt deleted");

        let response = app
            .oneshot(Request::get("/knowledge/files").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(upload("wiring.dwg", b"binary"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "unsupported_format");
        assert_eq!(body["message"], "Unsupported file format: dwg");
    }

    #[tokio::test]
    async fn test_delete_unknown_file() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(
                Request::delete("/knowledge/files/missing.pdf")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "file_not_found");
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(multipart_request(
                "/knowledge/upload",
                multipart_body(&[("note", "x")], &[]),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
