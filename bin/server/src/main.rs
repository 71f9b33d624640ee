mod auth;
mod config;
mod constants;
mod handlers;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use actix_web::{web, App, HttpServer};
use config::{ServerCommand, ServerConfig, StorageType};
use crypto::SignatureService;
use drive::{HttpDriveGateway, RemoteStorageGateway};
use state::{AppState, SignedLinkSettings};
use std::sync::Arc;
use storage::{Storage, StorageBackend};
use tracing::{error, info, warn};

fn io_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Filter out actix-server worker shutdown messages
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info")
                    .add_directive("actix_server::worker=warn".parse().unwrap())
                    .add_directive("actix_server::accept=warn".parse().unwrap())
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, command) = ServerConfig::load()?;
    let storage = initialize_storage(&config).await?;
    info!("Storage backend initialized successfully");

    match command {
        ServerCommand::AddPrincipal { id, max_storage } => {
            add_principal(storage.as_ref(), &id, max_storage.unwrap_or(config.default_max_storage))
                .await
        }
        ServerCommand::RecomputeUsage { id } => recompute_usage(storage.as_ref(), &id).await,
        ServerCommand::Serve => serve(config, storage).await,
    }
}

async fn initialize_storage(config: &ServerConfig) -> std::io::Result<Arc<dyn Storage>> {
    let backend = match config.storage_type {
        StorageType::Database => {
            let retry_config = config.database_retry_config.clone();
            info!(
                "Using database storage (max_attempts={}, initial_delay_seconds={})",
                retry_config.max_attempts, retry_config.initial_delay_seconds
            );
            StorageBackend::Database {
                database_url: config.database_url.clone().unwrap_or_default(),
                retry_config: Some(retry_config),
            }
        }
        StorageType::Filesystem => {
            info!("Using filesystem storage: {:?}", config.data_dir);
            StorageBackend::Filesystem(config.data_dir.to_string_lossy().into_owned())
        }
    };

    backend.initialize().await.map_err(|e| {
        error!("Failed to initialize storage: {}", e);
        io_error(format!("Failed to initialize storage: {}", e))
    })
}

/// Provision a principal; the plaintext token is printed once and never stored
async fn add_principal(storage: &dyn Storage, id: &str, max_storage: u64) -> std::io::Result<()> {
    let token = crypto::generate_token();
    storage
        .create_principal(id, &crypto::hash_token(&token), max_storage)
        .await
        .map_err(|e| {
            error!("Failed to create principal {}: {}", id, e);
            io_error(format!("Failed to create principal {}: {}", id, e))
        })?;
    info!(principal = %id, max_storage, "Principal created");
    println!("{}", token);
    Ok(())
}

async fn recompute_usage(storage: &dyn Storage, id: &str) -> std::io::Result<()> {
    let quota = storage.recompute_usage(id).await.map_err(|e| {
        error!("Failed to recompute usage for {}: {}", id, e);
        io_error(format!("Failed to recompute usage for {}: {}", id, e))
    })?;
    info!(principal = %id, used_storage = quota.used_storage, "Usage recomputed");
    println!("{} of {} bytes used", quota.used_storage, quota.max_storage);
    Ok(())
}

async fn serve(config: ServerConfig, storage: Arc<dyn Storage>) -> std::io::Result<()> {
    info!("Starting storage server (PID: {})", std::process::id());

    let secret = config.signing_secret.clone().ok_or_else(|| {
        error!("SIGNING_SECRET must be set to issue signed links");
        io_error("SIGNING_SECRET must be set to issue signed links".to_string())
    })?;

    let gateway: Option<Arc<dyn RemoteStorageGateway>> = match config.drive.clone() {
        Some(drive) => {
            info!("Storage provider at {}", drive.api_url);
            Some(Arc::new(HttpDriveGateway::new(drive)))
        }
        None => {
            warn!("No storage provider credentials configured; uploads will be rejected");
            None
        }
    };

    let state = web::Data::new(AppState::new(
        storage,
        gateway,
        SignatureService::new(secret),
        SignedLinkSettings {
            public_base_url: config.public_base_url.clone(),
            default_ttl_minutes: config.signed_url_ttl_minutes,
        },
    ));

    let bind_address = config.bind_address();
    info!("Starting server on http://{}", bind_address);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .map_err(|e| {
        error!("Failed to bind to {}: {}", bind_address, e);
        e
    })?;

    info!("Server bound successfully to http://{}", bind_address);
    server.run().await
}
