//! Fills a `.docx` template from a JSON payload over HTTP.
//!
//! `POST /generate-doc` replaces every `{{key}}` in the template's paragraphs
//! and table cells with the payload's values, optionally drops a downloaded
//! picture at `{{INSERTAR_IMAGEN}}`, stores the result under the output
//! directory and sends it back as an attachment.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod document;
pub mod error;
pub mod generate;
pub mod placeholders;
pub mod remote_image;

pub use api::AppState;
pub use config::Config;
pub use generate::{GenerateError, GeneratedDocument, Generator};

/// Routes with permissive CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::handle_health))
        .route("/generate-doc", post(api::handle_generate_doc))
        .route("/template/placeholders", get(api::handle_template_placeholders))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
