//! Wisp one-time file drop server
//!
//! Upload a file, share the link, and it is gone after the first download or
//! when the expiry timer fires, whichever comes first.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wisp_core::TransferStore;
use wisp_server::{AppState, ServerConfig, sweep};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    // Initialize logging (RUST_LOG takes precedence over the CLI flags)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate().context("Invalid configuration")?;

    tracing::info!("Server configuration:");
    for line in config.summary() {
        tracing::info!("  {}", line);
    }
    if config.is_default_password() {
        tracing::warn!("Using the default upload password; set UPLOAD_PASSWORD for real use");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;

    // Files from a previous run are unreachable; reclaim the stale ones
    if let Err(e) = sweep::remove_stale_files(&config.upload_dir, config.expiry()).await {
        tracing::warn!("Startup sweep failed: {}", e);
    }

    let store = TransferStore::new(config.expiry());
    let state = AppState::new(config, store);

    wisp_server::serve(state, shutdown_signal())
        .await
        .context("Server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
