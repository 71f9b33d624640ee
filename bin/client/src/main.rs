//! Cloud storage upload client

mod api;
mod config;
mod constants;
mod logger;
mod queue;
mod scheduler;
mod source;
mod store;
#[cfg(test)]
mod test_support;
mod transfer;

use anyhow::{bail, Context, Result};
use api::ServerApi;
use clap::{Parser, Subcommand};
use common::file_utils;
use config::ClientConfig;
use constants::{CLIENT_DATA_DIR, DEFAULT_SERVER_URL};
use drive::HttpTransport;
use log::info;
use queue::{UploadItem, UploadStatus};
use scheduler::UploadQueue;
use source::{ChunkSource, FileSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::QueueStore;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Resumable upload client for the cloud storage server")]
struct Cli {
    /// Server URL
    #[arg(short, long, global = true, env = "CLOUD_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,
    /// Bearer token issued by `server principal add`
    #[arg(short, long, global = true, env = "CLOUD_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Directory holding the persisted upload queue
    #[arg(long, global = true, env = "CLIENT_DATA_DIR", default_value = CLIENT_DATA_DIR)]
    data_dir: PathBuf,
    /// Maximum parallel uploads (persisted with the queue)
    #[arg(short, long, global = true)]
    concurrency: Option<usize>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue files and upload them
    Upload {
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Destination folder id
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Reload the persisted queue and run whatever can run
    Resume,
    /// Reattach a file to a paused item and upload it
    Attach { id: String, path: PathBuf },
    /// Retry a failed item
    Retry { id: String },
    /// Show the persisted queue
    Status,
    /// Dismiss an item
    Remove { id: String },
    /// Cancel everything and forget the queue
    Clear,
    /// Request signed view and download links for a stored file
    Share {
        file_id: String,
        /// Link lifetime in minutes
        #[arg(long)]
        ttl: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let config = ClientConfig::new(cli.server, cli.token, cli.data_dir);

    match cli.command {
        Commands::Upload { paths, parent } => {
            config.require_token()?;
            let queue = open_queue(&config, cli.concurrency)?;
            for path in &paths {
                let (name, source) = load_source(path).await?;
                let mime_type = mime_guess::from_path(path)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string();
                queue.enqueue(&name, &mime_type, parent.clone(), source)?;
            }
            run(&queue).await
        }
        Commands::Resume => {
            config.require_token()?;
            let queue = open_queue(&config, cli.concurrency)?;
            run(&queue).await
        }
        Commands::Attach { id, path } => {
            config.require_token()?;
            let queue = open_queue(&config, cli.concurrency)?;
            let item = queue
                .item(&id)
                .with_context(|| format!("No queued upload with id {}", id))?;
            let (name, source) = load_source(&path).await?;
            if name != item.file_name {
                bail!(
                    "{} does not match the queued file {}",
                    name,
                    item.file_name
                );
            }
            queue.attach(&id, source)?;
            run(&queue).await
        }
        Commands::Retry { id } => {
            config.require_token()?;
            let queue = open_queue(&config, cli.concurrency)?;
            if queue.retry(&id)? == UploadStatus::Paused {
                println!("{} is paused until its file is reattached with `attach`", id);
            }
            run(&queue).await
        }
        Commands::Status => {
            let state = QueueStore::new(config.queue_path()).load()?;
            if state.queue.is_empty() {
                println!("Upload queue is empty");
            }
            for item in &state.queue {
                print_item(item);
            }
            Ok(())
        }
        Commands::Remove { id } => {
            let queue = open_queue(&config, None)?;
            match queue.remove(&id)? {
                Some(item) => println!("Removed {} ({})", item.file_name, item.id),
                None => println!("No queued upload with id {}", id),
            }
            Ok(())
        }
        Commands::Clear => {
            open_queue(&config, None)?.clear()?;
            println!("Upload queue cleared");
            Ok(())
        }
        Commands::Share { file_id, ttl } => {
            let api = ServerApi::new(&config.server, config.require_token()?);
            let links = api.signed_url(&file_id, ttl).await?;
            println!("View:     {}", links.view_url);
            println!("Download: {}", links.download_url);
            Ok(())
        }
    }
}

fn open_queue(config: &ClientConfig, concurrency: Option<usize>) -> Result<UploadQueue> {
    let token = config.token.as_deref().unwrap_or_default();
    let api = Arc::new(ServerApi::new(&config.server, token));
    let transport =
        Arc::new(HttpTransport::with_default_client().context("Failed to build HTTP client")?);
    let queue = UploadQueue::open(QueueStore::new(config.queue_path()), api, transport)?;
    if let Some(concurrency) = concurrency {
        queue.set_concurrency(concurrency)?;
    }
    Ok(queue)
}

async fn load_source(path: &Path) -> Result<(String, Arc<dyn ChunkSource>)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
        .with_context(|| format!("Invalid file path: {:?}", path))?;
    file_utils::validate_filename(&name).map_err(|e| anyhow::anyhow!("{}: {}", e.message(), name))?;

    let source = FileSource::open(path)
        .await
        .with_context(|| format!("Failed to open file: {:?}", path))?;
    if source.len() == 0 {
        bail!("{} is empty", name);
    }
    let source: Arc<dyn ChunkSource> = Arc::new(source);
    Ok((name, source))
}

async fn run(queue: &UploadQueue) -> Result<()> {
    queue.run_until_idle().await;

    let state = queue.snapshot();
    for item in &state.queue {
        print_item(item);
    }
    let failed = state
        .queue
        .iter()
        .filter(|i| i.status == UploadStatus::Error)
        .count();
    let completed = state
        .queue
        .iter()
        .filter(|i| i.status == UploadStatus::Completed)
        .count();
    info!("{} completed, {} failed, {} total", completed, failed, state.queue.len());
    if failed > 0 {
        bail!("{} upload(s) failed", failed);
    }
    Ok(())
}

fn print_item(item: &UploadItem) {
    let detail = match item.status {
        UploadStatus::Completed => item
            .file_id
            .as_deref()
            .map(|id| format!("file {}", id))
            .unwrap_or_default(),
        UploadStatus::Error => item.error.clone().unwrap_or_default(),
        UploadStatus::Paused => "reattach with `attach`".to_string(),
        _ => String::new(),
    };
    println!(
        "{}  {:<9} {:>3}%  {}  {}",
        item.id, item.status.to_string(), item.progress, item.file_name, detail
    );
}
