//! Error types for the HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::generate::GenerateError;

/// Errors a handler turns into `{"error": "<message>"}` responses.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    TemplateNotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Internal error: {}", self);
        }

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<GenerateError> for ServerError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::TemplateNotFound(_) => ServerError::TemplateNotFound(err.to_string()),
            GenerateError::InvalidPayload(msg) => ServerError::InvalidRequest(msg),
            GenerateError::Template(e) => ServerError::Internal(e.to_string()),
        }
    }
}
