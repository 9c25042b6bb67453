use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use docx_rs::{read_docx, Docx, DrawingData, Pic, RunChild};
use file_format::FileFormat;
use image::ImageFormat;
use regex::Regex;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::placeholders::{normalize_text, paragraphs_mut, runs_mut};

/// MIME type of a `.docx` response body.
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";

static RELATIONSHIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<Relationship\b[^>]*>").expect("relationship pattern compiles")
});
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(Id|Target|Type|TargetMode)="([^"]*)""#).expect("attribute pattern compiles")
});

/// Error type returned when loading a template or saving a generated document.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// An I/O error (reading the template, writing or re-reading the output).
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The template is not a `.docx` container or docx-rs could not parse it.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    /// docx-rs failed to pack the document.
    #[error("could not write document: {0}")]
    Write(String),
}

impl From<ZipError> for TemplateError {
    fn from(e: ZipError) -> Self {
        match e {
            ZipError::Io(io_err) => Self::Io(io_err),
            other => Self::InvalidTemplate(other.to_string()),
        }
    }
}

/// Reads `path` into memory after checking it really is a `.docx` file.
///
/// The loaded document is ready to be written back: run text is in the form
/// the writer expects and pictures carry their bytes again.
pub fn load_template(path: &Path) -> Result<Docx, TemplateError> {
    let format = FileFormat::from_file(path)?;
    if format.extension() != "docx" {
        return Err(TemplateError::InvalidTemplate(format!(
            "{} is not a .docx file (detected {})",
            path.display(),
            format.name()
        )));
    }

    let buf = std::fs::read(path)?;
    let mut docx = read_docx(&buf).map_err(|e| TemplateError::InvalidTemplate(e.to_string()))?;
    normalize_text(&mut docx);
    restore_media(&mut docx, &buf)?;
    Ok(docx)
}

/// docx-rs reads pictures without their image data, which would pack them as
/// empty media parts. Refill each one from the part its relationship targets.
fn restore_media(docx: &mut Docx, template: &[u8]) -> Result<(), TemplateError> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let Some(rels) = read_part(&mut archive, DOCUMENT_RELS)? else {
        return Ok(());
    };
    let targets = image_targets(&String::from_utf8_lossy(&rels));

    for pic in pictures_mut(docx) {
        if !pic.image.is_empty() {
            continue;
        }
        let Some(part) = targets.get(&pic.id) else {
            continue;
        };
        if let Some(bytes) = read_part(&mut archive, part)? {
            pic.image = as_png(bytes);
        }
    }
    Ok(())
}

fn pictures_mut(docx: &mut Docx) -> Vec<&mut Pic> {
    let mut pics = Vec::new();
    for paragraph in paragraphs_mut(docx) {
        for run in runs_mut(paragraph) {
            for child in run.children.iter_mut() {
                if let RunChild::Drawing(drawing) = child {
                    if let Some(DrawingData::Pic(pic)) = &mut drawing.data {
                        pics.push(pic);
                    }
                }
            }
        }
    }
    pics
}

/// Relationship id to zip part name, for internal image relationships.
fn image_targets(rels: &str) -> HashMap<String, String> {
    let mut targets = HashMap::new();
    for rel in RELATIONSHIP.find_iter(rels) {
        let attrs: HashMap<&str, &str> = ATTRIBUTE
            .captures_iter(rel.as_str())
            .filter_map(|cap| Some((cap.get(1)?.as_str(), cap.get(2)?.as_str())))
            .collect();
        let is_image = attrs.get("Type").is_some_and(|t| t.ends_with("/image"));
        let external = attrs.get("TargetMode") == Some(&"External");
        if let (true, false, Some(id), Some(target)) =
            (is_image, external, attrs.get("Id"), attrs.get("Target"))
        {
            let part = match target.strip_prefix('/') {
                Some(absolute) => absolute.to_owned(),
                None => format!("word/{target}"),
            };
            targets.insert((*id).to_owned(), part);
        }
    }
    targets
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, TemplateError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// docx-rs stores every picture as `media/<id>.png`; re-encode what we can
/// decode so the bytes match the name. Anything else is kept as-is.
fn as_png(bytes: Vec<u8>) -> Vec<u8> {
    let png = image::load_from_memory(&bytes).ok().and_then(|img| {
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).ok()?;
        Some(png)
    });
    png.unwrap_or(bytes)
}

/// Packs `docx` into `output_path`, creating parent directories as needed.
/// An existing file at that path is overwritten.
pub fn save_docx(docx: Docx, output_path: &Path) -> Result<(), TemplateError> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(output_path)?;
    docx.build()
        .pack(file)
        .map_err(|e| TemplateError::Write(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use docx_rs::{Paragraph, Run};
    use image::{DynamicImage, RgbImage};
    use pretty_assertions::assert_eq;

    /// Writes a template with one paragraph per entry of `paragraphs`.
    pub(crate) fn write_template(path: &Path, paragraphs: &[&str]) {
        let docx = paragraphs.iter().fold(Docx::new(), |docx, text| {
            docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)))
        });
        save_docx(docx, path).unwrap();
    }

    #[test]
    fn saved_document_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/plantilla.docx");
        write_template(&path, &["Hello {{name}}!"]);

        let docx = load_template(&path).unwrap();

        assert_eq!(
            crate::placeholders::collect_text_units(&docx),
            vec!["Hello {{name}}!".to_string()]
        );
    }

    #[test]
    fn non_docx_file_is_an_invalid_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plantilla.docx");
        std::fs::write(&path, "just some text, not a zip archive").unwrap();

        let err = load_template(&path).unwrap_err();

        assert!(matches!(err, TemplateError::InvalidTemplate(_)), "got {err:?}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_template(&dir.path().join("absent.docx")).unwrap_err();

        assert!(matches!(err, TemplateError::Io(_)));
    }

    #[test]
    fn loaded_pictures_get_their_media_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plantilla.docx");
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(6, 3))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let docx = Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_image(Pic::new(&png))));
        save_docx(docx, &path).unwrap();

        let mut docx = load_template(&path).unwrap();

        let pics = pictures_mut(&mut docx);
        assert_eq!(pics.len(), 1);
        let restored = image::load_from_memory(&pics[0].image).unwrap();
        assert_eq!((restored.width(), restored.height()), (6, 3));
    }

    #[test]
    fn image_relationships_resolve_to_package_parts() {
        let rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
  <Relationship Target="/word/media/logo.jpeg" Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image"/>
  <Relationship Id="rId6" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="https://example.com/a.png" TargetMode="External"/>
</Relationships>"#;

        let targets = image_targets(rels);

        assert_eq!(targets.len(), 2);
        assert_eq!(targets["rId4"], "word/media/image1.png");
        assert_eq!(targets["rId5"], "word/media/logo.jpeg");
    }

    #[test]
    fn undecodable_media_is_kept_verbatim() {
        assert_eq!(as_png(b"EMF?".to_vec()), b"EMF?".to_vec());
    }
}
