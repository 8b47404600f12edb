//! # waypost-server
//!
//! HTTP API for the Waypost social graph.
//!
//! This binary provides:
//! - **Profiles** with image upload to local blob storage
//! - **Friend requests, friend lists and blocks**, each multi-record change
//!   committed atomically
//! - **Notification feed** with read tracking
//! - **Like and comment notifications** for post authors
//!
//! Callers are identified by the `x-user-id` header, which an upstream auth
//! proxy sets after verifying the session.

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use waypost_social::Social;
use waypost_store::{BlobStore, DocumentStore, MemoryStore, SqliteStore};

use crate::api::AppState;
use crate::config::{DatabaseLocation, ServerConfig};

fn open_store(location: &DatabaseLocation) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match location {
        DatabaseLocation::Memory => {
            tracing::warn!("Using in-memory store, data will not persist");
            Arc::new(MemoryStore::new())
        }
        DatabaseLocation::Path(path) => Arc::new(SqliteStore::open_at(path)?),
        DatabaseLocation::Default => Arc::new(SqliteStore::open_default()?),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,waypost_server=debug,waypost_social=debug")
        }))
        .init();

    info!("Starting Waypost server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = open_store(&config.database)?;

    let blobs = BlobStore::new(
        config.blob_storage_path.clone(),
        &config.public_base_url,
        config.max_image_size,
    )
    .await?;

    let social = Social::new(store, Some(blobs.clone()), config.notification_page_size);

    let http_addr = config.http_addr;
    let app_state = AppState {
        social,
        blobs: Some(blobs),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
