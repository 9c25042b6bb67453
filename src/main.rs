use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docxside_server::{router, AppState, Config, Generator};

/// Command-line arguments for the document server
#[derive(Parser, Debug)]
#[command(name = "docxside-server")]
#[command(about = "Fills a .docx template from JSON and returns the document")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Directory the default paths are resolved against
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Template path, relative to the working directory
    #[arg(long)]
    template: Option<PathBuf>,

    /// Where generated documents are written
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Upload directory, created on startup
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Payload key holding the image URL
    #[arg(long, default_value = "imagen1")]
    image_field: String,

    /// Timeout for the image download in milliseconds
    #[arg(long, default_value = "10000")]
    image_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::rooted_at(&self.workdir);
        if let Some(template) = &self.template {
            config.template_path = self.workdir.join(template);
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = self.workdir.join(output_dir);
        }
        if let Some(upload_dir) = &self.upload_dir {
            config.upload_dir = self.workdir.join(upload_dir);
        }
        config.image_field = self.image_field.clone();
        config.image_timeout = Duration::from_millis(self.image_timeout_ms);
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.config();
    config.ensure_dirs()?;
    if !config.template_exists() {
        warn!(
            "Template {} is missing; /generate-doc will answer 404 until it exists",
            config.template_path.display()
        );
    }

    info!("Template: {}", config.template_path.display());
    info!("Output directory: {}", config.output_dir.display());
    info!("Image download timeout: {}ms", args.image_timeout_ms);

    // The blocking HTTP client may not be built on a runtime worker thread.
    let generator = tokio::task::spawn_blocking(move || Generator::with_http(config)).await??;
    let app = router(AppState::new(generator));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
