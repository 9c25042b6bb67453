use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the template, relative to the working directory.
pub const DEFAULT_TEMPLATE: &str = "templates_doc/plantilla.docx";
pub const DEFAULT_OUTPUT_DIR: &str = "generated_docs";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
/// Payload key that carries the optional image URL.
pub const DEFAULT_IMAGE_FIELD: &str = "imagen1";
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Paths and knobs handed to the generator at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub template_path: PathBuf,
    pub output_dir: PathBuf,
    /// Created on startup, never written to.
    pub upload_dir: PathBuf,
    pub image_field: String,
    pub image_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from(DEFAULT_TEMPLATE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            image_field: DEFAULT_IMAGE_FIELD.to_owned(),
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
        }
    }
}

impl Config {
    /// Default layout rooted at `workdir`.
    pub fn rooted_at<P: AsRef<Path>>(workdir: P) -> Self {
        let root = workdir.as_ref();
        Self {
            template_path: root.join(DEFAULT_TEMPLATE),
            output_dir: root.join(DEFAULT_OUTPUT_DIR),
            upload_dir: root.join(DEFAULT_UPLOAD_DIR),
            ..Self::default()
        }
    }

    /// Creates the template, output and upload directories. Safe to call repeatedly.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        if let Some(template_dir) = self.template_path.parent() {
            if !template_dir.as_os_str().is_empty() {
                std::fs::create_dir_all(template_dir)?;
            }
        }
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.upload_dir)?;
        Ok(())
    }

    pub fn template_exists(&self) -> bool {
        self.template_path.is_file()
    }
}
