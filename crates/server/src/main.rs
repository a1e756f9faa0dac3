//! gold-offline server entry point.
//!
//! Boots the offline caching proxy over the SQLite cache and serves it over
//! HTTP. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use goldcache_client::{FetchClient, FetchConfig, OfflineCacheProxy, WorkerConfig};
use goldcache_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        cache = %config.cache_name,
        origin = %config.origin,
        listen = %config.listen_addr,
        db = %config.db_path.display(),
        "starting gold-offline"
    );

    let storage = Arc::new(CacheDb::open(&config.db_path).await?);
    let network = Arc::new(FetchClient::new(FetchConfig::from_app(&config)?)?);

    let has_predecessor = storage.bucket_names().await?.iter().any(|name| name != &config.cache_name);
    let proxy = Arc::new(OfflineCacheProxy::new(WorkerConfig::from_app(&config)?, storage, network));

    proxy.install().await?;
    if let Err(e) = proxy.activate_if_ready(has_predecessor).await {
        tracing::error!(error = %e, "activation failed; passing requests through until retried");
    }

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    let app = handler::router(handler::AppState { proxy: Arc::clone(&proxy), max_body: config.max_bytes });
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    proxy.settle().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
