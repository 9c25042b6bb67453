//! One request, start to finish: check the template, parse the payload, fill,
//! embed the optional picture, persist and read back.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::{load_template, save_docx, TemplateError};
use crate::placeholders::{find_placeholders, substitute};
use crate::remote_image::{has_marker, insert_image, HttpImageSource, ImageOutcome, ImageSource, SkipReason};

/// Message for an absent, empty or `{}` body.
pub const MISSING_DATA: &str = "Los datos son obligatorios";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("La plantilla {} no existe", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("{0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A persisted, filled-in document.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// `None` when the payload asked for no picture.
    pub image: Option<ImageOutcome>,
}

/// What the template expects from callers.
#[derive(Debug, Serialize)]
pub struct TemplateSummary {
    pub template: String,
    pub placeholders: Vec<String>,
    pub image_marker: bool,
}

pub struct Generator {
    config: Config,
    images: Box<dyn ImageSource>,
}

impl Generator {
    pub fn new(config: Config, images: impl ImageSource + 'static) -> Self {
        Self {
            config,
            images: Box::new(images),
        }
    }

    /// Generator that downloads pictures over HTTP with the configured timeout.
    pub fn with_http(config: Config) -> Result<Self, reqwest::Error> {
        let images = HttpImageSource::new(config.image_timeout)?;
        Ok(Self::new(config, images))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn generate(&self, body: &[u8]) -> Result<GeneratedDocument, GenerateError> {
        self.generate_at(body, Local::now())
    }

    /// Output names have one-second resolution: two documents generated
    /// within the same second share a name and the later one wins.
    pub fn generate_at(
        &self,
        body: &[u8],
        now: DateTime<Local>,
    ) -> Result<GeneratedDocument, GenerateError> {
        self.check_template()?;
        let data = parse_payload(body)?;

        let mut docx = load_template(&self.config.template_path)?;
        let replaced = substitute(&mut docx, &data);
        debug!(replaced, keys = data.len(), "placeholders substituted");

        let image = self.image_step(&mut docx, &data);

        let file_name = output_file_name(now);
        let path = self.config.output_dir.join(&file_name);
        save_docx(docx, &path)?;
        let bytes = std::fs::read(&path).map_err(TemplateError::from)?;
        info!(path = %path.display(), size = bytes.len(), "document generated");

        Ok(GeneratedDocument {
            file_name,
            path,
            bytes,
            image,
        })
    }

    pub fn summary(&self) -> Result<TemplateSummary, GenerateError> {
        self.check_template()?;
        let docx = load_template(&self.config.template_path)?;
        Ok(TemplateSummary {
            template: self.config.template_path.display().to_string(),
            placeholders: find_placeholders(&docx),
            image_marker: has_marker(&docx),
        })
    }

    fn check_template(&self) -> Result<(), GenerateError> {
        if self.config.template_exists() {
            Ok(())
        } else {
            Err(GenerateError::TemplateNotFound(self.config.template_path.clone()))
        }
    }

    fn image_step(&self, docx: &mut docx_rs::Docx, data: &Map<String, Value>) -> Option<ImageOutcome> {
        let value = data.get(&self.config.image_field).filter(|v| !is_blank(v))?;
        let outcome = match value {
            Value::String(url) => insert_image(docx, self.images.as_ref(), url),
            _ => ImageOutcome::Skipped(SkipReason::NotAString),
        };

        match &outcome {
            ImageOutcome::Embedded => info!(field = %self.config.image_field, "image embedded"),
            ImageOutcome::Skipped(reason) => {
                warn!(field = %self.config.image_field, %reason, "image skipped")
            }
        }
        Some(outcome)
    }
}

/// Values that mean "no picture": null, false, zero and empty strings or collections.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Parses a request body into the substitution map.
pub fn parse_payload(body: &[u8]) -> Result<Map<String, Value>, GenerateError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GenerateError::InvalidPayload(MISSING_DATA.to_owned()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| GenerateError::InvalidPayload(format!("JSON inválido: {e}")))?;
    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        Value::Object(_) | Value::Null => Err(GenerateError::InvalidPayload(MISSING_DATA.to_owned())),
        _ => Err(GenerateError::InvalidPayload(
            "Los datos deben ser un objeto JSON".to_owned(),
        )),
    }
}

/// `documento_<YYYYMMDDHHMMSS>.docx` in local time.
pub fn output_file_name(now: DateTime<Local>) -> String {
    format!("documento_{}.docx", now.format("%Y%m%d%H%M%S"))
}
