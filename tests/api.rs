//! HTTP-level tests for the document service.

use std::path::Path;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tower::ServiceExt;

use docxside_server::document::{save_docx, DOCX_CONTENT_TYPE};
use docxside_server::placeholders::find_placeholders;
use docxside_server::remote_image::FetchError;
use docxside_server::{router, AppState, Config, Generator};

fn no_images(url: &str) -> Result<Vec<u8>, FetchError> {
    panic!("unexpected image fetch for {url}")
}

fn text(s: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(s))
}

fn write_template(path: &Path) {
    let docx = Docx::new()
        .add_paragraph(text("Hello {{name}}!"))
        .add_paragraph(text("{{INSERTAR_IMAGEN}}"))
        .add_table(Table::new(vec![TableRow::new(vec![
            TableCell::new().add_paragraph(text("{{amount}}")),
        ])]));
    save_docx(docx, path).unwrap();
}

/// Working directory with the default layout; the template is optional.
fn setup(with_template: bool) -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::rooted_at(dir.path());
    config.ensure_dirs().unwrap();
    if with_template {
        write_template(&config.template_path);
    }
    (dir, config)
}

fn app(config: Config) -> Router {
    router(AppState::new(Generator::new(config, no_images)))
}

fn generate_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate-doc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn error_message(response: axum::response::Response) -> String {
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    json["error"].as_str().unwrap().to_owned()
}

fn output_texts(bytes: &[u8]) -> Vec<String> {
    let docx = docx_rs::read_docx(bytes).unwrap();
    let mut texts = Vec::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => texts.push(p.raw_text()),
            docx_rs::DocumentChild::Table(t) => {
                for row in &t.rows {
                    let docx_rs::TableChild::TableRow(row) = row;
                    for cell in &row.cells {
                        let docx_rs::TableRowChild::TableCell(cell) = cell;
                        for content in &cell.children {
                            if let docx_rs::TableCellContent::Paragraph(p) = content {
                                texts.push(p.raw_text());
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    texts
}

#[tokio::test]
async fn generate_returns_filled_attachment() {
    let (dir, config) = setup(true);

    let response = app(config)
        .oneshot(generate_request(r#"{"name": "Ada", "amount": 42}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], DOCX_CONTENT_TYPE);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_owned();
    assert!(disposition.starts_with("attachment; filename=\"documento_"));
    assert!(disposition.ends_with(".docx\""));

    let file_name = disposition
        .trim_start_matches("attachment; filename=\"")
        .trim_end_matches('"')
        .to_owned();
    let stamp = file_name
        .trim_start_matches("documento_")
        .trim_end_matches(".docx");
    assert_eq!(stamp.len(), 14);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));

    let bytes = body_bytes(response).await;
    let saved = std::fs::read(dir.path().join("generated_docs").join(&file_name)).unwrap();
    assert_eq!(bytes, saved);
    assert_eq!(
        output_texts(&bytes),
        vec!["Hello Ada!", "{{INSERTAR_IMAGEN}}", "42"]
    );

    let remaining = find_placeholders(&docx_rs::read_docx(&bytes).unwrap());
    assert_eq!(remaining, vec!["INSERTAR_IMAGEN".to_string()]);
}

#[tokio::test]
async fn missing_template_is_404_even_without_body() {
    let (_dir, config) = setup(false);

    let response = app(config).oneshot(generate_request("")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let message = error_message(response).await;
    assert!(message.starts_with("La plantilla "), "{message}");
    assert!(message.ends_with("plantilla.docx no existe"), "{message}");
}

#[tokio::test]
async fn missing_or_invalid_body_is_400() {
    let (_dir, config) = setup(true);
    let app = app(config);

    for body in ["", "{}", "[1, 2, 3]", "{\"name\": "] {
        let response = app.clone().oneshot(generate_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body:?}");
        assert!(!error_message(response).await.is_empty());
    }
}

#[tokio::test]
async fn corrupt_template_is_500_with_message() {
    let (_dir, config) = setup(false);
    std::fs::write(&config.template_path, "not a word document").unwrap();

    let response = app(config)
        .oneshot(generate_request(r#"{"name": "Ada"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(response).await.starts_with("invalid template"));
}

#[tokio::test]
async fn unreachable_image_host_still_returns_document() {
    let (_dir, config) = setup(true);
    let generator = tokio::task::spawn_blocking(move || Generator::with_http(config))
        .await
        .unwrap()
        .unwrap();
    let app = router(AppState::new(generator));

    let response = app
        .oneshot(generate_request(
            r#"{"name": "Ada", "imagen1": "http://127.0.0.1:1/logo.png"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body_bytes(response).await;
    assert_eq!(output_texts(&bytes)[0], "Hello Ada!");
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (_dir, config) = setup(true);

    let response = app(config)
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/generate-doc")
                .header(header::ORIGIN, "https://forms.example.org")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn placeholders_endpoint_describes_template() {
    let (_dir, config) = setup(true);

    let response = app(config)
        .oneshot(
            Request::builder()
                .uri("/template/placeholders")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(
        json["placeholders"],
        serde_json::json!(["name", "INSERTAR_IMAGEN", "amount"])
    );
    assert_eq!(json["image_marker"], Value::Bool(true));
}

#[tokio::test]
async fn placeholders_endpoint_404_without_template() {
    let (_dir, config) = setup(false);

    let response = app(config)
        .oneshot(
            Request::builder()
                .uri("/template/placeholders")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_service() {
    let (_dir, config) = setup(false);

    let response = app(config)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "docxside-server");
}
