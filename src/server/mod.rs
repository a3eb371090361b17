// src/server/mod.rs
//! Sideload HTTP server
//!
//! Exposes the catalog over a small JSON API plus the raw endpoints the
//! device installer needs:
//! - `/api/*` - list, info, search, upload, edit, delete
//! - `/plist/{id}.plist` - OTA install manifest
//! - `/pkg/{id}.{ext}` and `/icon/{id}.png` - stored files

pub mod config;
mod handlers;
pub mod metrics;
mod routes;

pub use config::SideloadConfig;
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use routes::create_router;

use crate::catalog::Catalog;
use crate::origin::Origin;
use crate::packages::{DecoderOptions, DecoderSet};
use crate::storage::{SqliteStorage, Storage};
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Root directory of the package store
    pub storage_root: PathBuf,
    /// Fixed external origin; `None` derives it from each request
    pub public_origin: Option<Origin>,
    /// Allow deleting packages through the API
    pub enable_delete: bool,
    /// Request body limit in bytes
    pub max_upload_size: usize,
    /// Package decoder settings
    pub decoder: DecoderOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            storage_root: PathBuf::from("/var/lib/sideload"),
            public_origin: None,
            enable_delete: false,
            max_upload_size: 2 * 1024 * 1024 * 1024,
            decoder: DecoderOptions::default(),
        }
    }
}

/// Shared server state
pub struct ServerState {
    pub config: ServerConfig,
    pub catalog: Arc<Catalog>,
    pub metrics: Arc<ServerMetrics>,
}

impl ServerState {
    /// Build state around an already opened storage backend
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Self {
        let catalog = Catalog::new(
            storage,
            DecoderSet::new(&config.decoder),
            config.enable_delete,
        );

        Self {
            config,
            catalog: Arc::new(catalog),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    /// Open the SQLite store under `config.storage_root` and build state
    pub fn open(config: ServerConfig) -> Result<Self> {
        let storage = SqliteStorage::open(&config.storage_root).with_context(|| {
            format!("Failed to open package store at {}", config.storage_root.display())
        })?;
        Ok(Self::new(config, Arc::new(storage)))
    }
}

/// Start the sideload server
pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting sideload server on {}", config.bind_addr);
    tracing::info!("Package store: {}", config.storage_root.display());
    match &config.public_origin {
        Some(origin) => tracing::info!("Public URL: {}", origin),
        None => tracing::info!("Public URL: derived from request headers"),
    }
    tracing::info!(
        "Delete: {}",
        if config.enable_delete { "enabled" } else { "disabled" }
    );

    let bind_addr = config.bind_addr;
    let state = tokio::task::spawn_blocking(move || ServerState::open(config))
        .await
        .context("Store initialization task failed")??;

    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Sideload is ready to serve");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Sideload server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
