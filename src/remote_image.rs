//! Downloads a picture and places it at the `{{INSERTAR_IMAGEN}}` marker.
//!
//! Nothing in here fails the request: every problem ends up as
//! [`ImageOutcome::Skipped`] and the caller decides how loudly to log it.

use std::io::Cursor;
use std::time::Duration;

use docx_rs::{DocumentChild, Docx, Paragraph, ParagraphChild, Pic, Run};
use image::ImageFormat;
use thiserror::Error;

use crate::placeholders::{paragraph_text, replace_in_nodes, stored, text_nodes};

/// Marker replaced by the downloaded picture. Only body paragraphs are searched.
pub const IMAGE_MARKER: &str = "{{INSERTAR_IMAGEN}}";

/// Rendered width of the inserted picture: 2 inches in EMU.
pub const IMAGE_WIDTH_EMU: u32 = 2 * 914_400;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Where image bytes come from.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

impl<F> ImageSource for F
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self(url)
    }
}

/// Blocking HTTP GET with a bounded timeout.
pub struct HttpImageSource {
    client: reqwest::blocking::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |source: reqwest::Error| FetchError::Request {
            url: url.to_owned(),
            source,
        };

        let response = self.client.get(url).send().map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug)]
pub enum ImageOutcome {
    Embedded,
    Skipped(SkipReason),
}

#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("image field is not a string")]
    NotAString,

    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no paragraph contains the image marker")]
    MarkerNotFound,

    #[error("could not decode image: {0}")]
    Decode(String),
}

/// Fetches `url` and embeds it at the first marker paragraph.
pub fn insert_image(docx: &mut Docx, source: &dyn ImageSource, url: &str) -> ImageOutcome {
    let bytes = match source.fetch(url) {
        Ok(bytes) => bytes,
        Err(e) => return ImageOutcome::Skipped(SkipReason::Fetch(e)),
    };
    embed_at_marker(docx, &bytes)
}

/// Appends a picture run to the first body paragraph holding the marker,
/// then strips the marker text. Later markers are left alone.
pub fn embed_at_marker(docx: &mut Docx, bytes: &[u8]) -> ImageOutcome {
    let marker = stored(IMAGE_MARKER);
    let Some(paragraph) = docx.document.children.iter_mut().find_map(|child| match child {
        DocumentChild::Paragraph(p) if paragraph_text(p).contains(&marker) => Some(p),
        _ => None,
    }) else {
        return ImageOutcome::Skipped(SkipReason::MarkerNotFound);
    };

    let pic = match picture(bytes) {
        Ok(pic) => pic,
        Err(reason) => return ImageOutcome::Skipped(reason),
    };

    paragraph
        .children
        .push(ParagraphChild::Run(Box::new(Run::new().add_image(pic))));
    remove_marker(paragraph, &marker);
    ImageOutcome::Embedded
}

/// Whether any body paragraph carries the image marker.
pub fn has_marker(docx: &Docx) -> bool {
    let marker = stored(IMAGE_MARKER);
    docx.document.children.iter().any(|child| match child {
        DocumentChild::Paragraph(p) => paragraph_text(p).contains(&marker),
        _ => false,
    })
}

fn remove_marker(paragraph: &mut Paragraph, marker: &str) {
    let mut nodes = text_nodes(paragraph);
    replace_in_nodes(&mut nodes, marker, "");
}

/// Decodes any supported format, re-encodes as PNG and scales to the fixed width.
fn picture(bytes: &[u8]) -> Result<Pic, SkipReason> {
    let img = image::load_from_memory(bytes).map_err(|e| SkipReason::Decode(e.to_string()))?;
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(SkipReason::Decode("image has no pixels".to_owned()));
    }

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| SkipReason::Decode(e.to_string()))?;

    let height_emu = (u64::from(IMAGE_WIDTH_EMU) * u64::from(height) / u64::from(width))
        .min(u64::from(u32::MAX)) as u32;
    Ok(Pic::new_with_dimensions(png, width, height).size(IMAGE_WIDTH_EMU, height_emu))
}
