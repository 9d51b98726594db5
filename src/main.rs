use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filegate::{
    config::{Config, ObjectBackend},
    credentials::EnvCredentials,
    object_store as obj,
    CallOptions, FileManager, Payload, ResultEnvelope, WriteRequest,
};

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Include debug details in the printed result.
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read a file or object.
    Get {
        path: String,
        /// Write the content here instead of embedding it in the result.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Write a file or object.
    Post {
        path: String,
        /// Text content to write.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// Local file whose bytes are written as binary content.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Expected MD5 hex digest; nothing is written if it does not match.
        #[arg(long)]
        md5: Option<String>,
        /// Metadata entry as key=value. Repeatable.
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },
    /// Delete a file or object.
    Delete { path: String },
    /// Show size, content type and stored metadata.
    Head { path: String },
    /// Copy to a new location, verify the copy, then delete the source.
    Move { source: String, destination: String },
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing. Stdout carries the result, so logs go to stderr.
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let config = Config::load()?;
    let manager = FileManager::from_config(&config, object_store(&config)?);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));
    let options = CallOptions {
        debug: cli.debug,
        cancel: Some(cancel),
    };

    let envelope = match cli.command {
        Command::Get { path, output } => {
            let envelope = manager.get(&path, &options).await;
            match output {
                Some(output) => save_content(envelope, &output).await?,
                None => envelope,
            }
        }
        Command::Post {
            path,
            text,
            file,
            md5,
            meta,
        } => {
            let payload = match (text, file) {
                (Some(text), _) => Payload::Text(text),
                (None, Some(file)) => Payload::Binary(tokio::fs::read(&file).await?.into()),
                (None, None) => anyhow::bail!("post requires --text or --file"),
            };
            let mut request = WriteRequest::new(payload);
            request.md5 = md5;
            for (key, value) in meta {
                request = request.with_metadata(key, value);
            }
            manager.post(&path, request, &options).await
        }
        Command::Delete { path } => manager.delete(&path, &options).await,
        Command::Head { path } => manager.head(&path, &options).await,
        Command::Move {
            source,
            destination,
        } => manager.move_file(&source, &destination, &options).await,
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if !envelope.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn object_store(config: &Config) -> anyhow::Result<Arc<dyn obj::ObjectStore>> {
    match config.storage.backend {
        ObjectBackend::Directory => {
            let store = obj::DirectoryStore::new(&config.storage.directory_path)?
                .with_chunk_size(config.transfer.chunk_size);
            info!(
                "Using directory object store at: {}",
                config.storage.directory_path
            );
            Ok(Arc::new(store))
        }
        ObjectBackend::S3 => {
            let store = obj::S3Store::new(&config.s3_settings(), Arc::new(EnvCredentials))?;
            info!(
                region = %config.storage.region,
                endpoint = config.storage.s3_endpoint.as_deref().unwrap_or("aws"),
                "Using S3 object store"
            );
            Ok(Arc::new(store))
        }
    }
}

/// Move read content into `output`, leaving only the summary in the envelope.
async fn save_content(
    mut envelope: ResultEnvelope,
    output: &Path,
) -> anyhow::Result<ResultEnvelope> {
    if let Some(content) = envelope.content.take() {
        tokio::fs::write(output, &content).await?;
        info!("Wrote {} bytes to {}", content.len(), output.display());
    }
    Ok(envelope)
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    warn!("Interrupt received, cancelling");
    cancel.cancel();
}
