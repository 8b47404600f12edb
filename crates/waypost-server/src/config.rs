//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use waypost_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_NOTIFICATION_PAGE_SIZE, MAX_IMAGE_SIZE};

/// Where documents are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite file in the platform data directory.
    Default,
    /// In-process store; everything is lost on exit.
    Memory,
    Path(PathBuf),
}

impl DatabaseLocation {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "" => Self::Default,
            ":memory:" => Self::Memory,
            path => Self::Path(PathBuf::from(path)),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Env: `DATABASE_PATH` (`:memory:` for a throwaway store)
    /// Default: platform data directory.
    pub database: DatabaseLocation,

    /// Filesystem path where uploaded images are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// Prefix for blob download URLs written onto profiles.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:8080`
    pub public_base_url: String,

    /// Env: `MAX_IMAGE_SIZE`
    /// Default: 10 MiB
    pub max_image_size: usize,

    /// Notifications loaded per feed page.
    /// Env: `NOTIFICATION_PAGE_SIZE`
    /// Default: `100`
    pub notification_page_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database: DatabaseLocation::Default,
            blob_storage_path: PathBuf::from("./blobs"),
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            max_image_size: MAX_IMAGE_SIZE,
            notification_page_size: DEFAULT_NOTIFICATION_PAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database = DatabaseLocation::parse(&path);
        }

        if let Some(path) = lookup("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            if !url.is_empty() {
                config.public_base_url = url;
            }
        }

        if let Some(val) = lookup("MAX_IMAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_image_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_IMAGE_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("NOTIFICATION_PAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.notification_page_size = n,
                _ => tracing::warn!(value = %val, "Invalid NOTIFICATION_PAGE_SIZE, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}
