//! Handlers for the document service
//!
//! - `POST /generate-doc`: fill the template and download the result
//! - `GET /template/placeholders`: what the template expects
//! - `GET /health`

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::document::DOCX_CONTENT_TYPE;
use crate::error::ServerError;
use crate::generate::{Generator, TemplateSummary};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
}

impl AppState {
    pub fn new(generator: Generator) -> Self {
        Self {
            generator: Arc::new(generator),
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "docxside-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /generate-doc
///
/// The body is taken raw so the template check runs before payload validation.
pub async fn handle_generate_doc(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ServerError> {
    info!("Generate request: {} byte body", body.len());

    let generator = state.generator.clone();
    let doc = tokio::task::spawn_blocking(move || generator.generate(&body))
        .await
        .map_err(|e| ServerError::Internal(format!("generation task failed: {e}")))??;

    let disposition = format!("attachment; filename=\"{}\"", doc.file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        doc.bytes,
    )
        .into_response())
}

/// Handler: GET /template/placeholders
pub async fn handle_template_placeholders(
    State(state): State<AppState>,
) -> Result<Json<TemplateSummary>, ServerError> {
    let generator = state.generator.clone();
    let summary = tokio::task::spawn_blocking(move || generator.summary())
        .await
        .map_err(|e| ServerError::Internal(format!("template inspection failed: {e}")))??;
    Ok(Json(summary))
}
