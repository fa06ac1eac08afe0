//! Kiroku - chunked multipart uploader
//!
//! Streams a local file through the upload pipeline in capture-sized
//! chunks, exercising the same path a live recorder would.

use clap::Parser;
use kiroku::config::{Config, StoreConfig, UploadConfig};
use kiroku::upload::UploadCoordinator;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Kiroku - incremental chunked multipart uploads
#[derive(Parser, Debug)]
#[command(name = "kiroku")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; store settings come from the
    /// environment when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destination object key
    #[arg(short, long)]
    key: String,

    /// File to upload
    input: PathBuf,

    /// Bytes read per simulated capture chunk
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Kiroku v{}", env!("CARGO_PKG_VERSION"));

    let (store_config, upload_config) = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            (config.store, config.upload)
        }
        None => (StoreConfig::from_env()?, UploadConfig::default()),
    };

    let mut coordinator = UploadCoordinator::from_store_config(&store_config, upload_config)?;
    coordinator.start(&args.key).await?;

    let mut file = tokio::fs::File::open(&args.input).await?;
    let mut buf = vec![0u8; args.chunk_size];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        coordinator.ingest(&buf[..n])?;
    }

    let location = coordinator.finish().await?;
    info!(location = %location, "upload complete");
    println!("{location}");

    Ok(())
}
