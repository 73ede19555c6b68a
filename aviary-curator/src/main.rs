//! Aviary Curator (aviary-curator) - Main entry point
//!
//! Serves photo suggestions, gallery capacity checks and detection
//! statistics for the aviary catalog over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aviary_common::config::{self, AviaryConfig, ROOT_FOLDER_ENV};
use aviary_common::db::init_database;
use aviary_common::SystemClock;
use aviary_curator::store::SqliteCatalogStore;
use aviary_curator::sweeper::Sweeper;
use aviary_curator::{build_router, AppState};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for aviary-curator
#[derive(Parser, Debug)]
#[command(name = "aviary-curator")]
#[command(about = "Photo curation service for the aviary catalog")]
#[command(version)]
struct Args {
    /// Root folder holding aviary.db and aviary.toml
    /// (falls back to AVIARY_ROOT_FOLDER, then the user config, then the OS default)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on, overriding bind_address from aviary.toml
    #[arg(short, long, env = "AVIARY_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV);
    let config = AviaryConfig::load_for_root(&root_folder).context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "aviary_curator={level},aviary_common={level},tower_http=info",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Aviary Curator v{}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", root_folder.display());

    let db_path = config::database_path(&root_folder);
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    info!("Database ready: {}", db_path.display());

    let store = Arc::new(SqliteCatalogStore::new(pool));
    let state = AppState::new(store, Arc::new(SystemClock), &config);

    // Background cleanup of expired cache entries and rate-limit windows
    let cache_sweeper = Sweeper::new(
        Arc::new(state.cache.clone()),
        Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
    );
    let rate_limit_sweeper = Sweeper::new(
        Arc::new(state.rate_limiter.clone()),
        Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
    );
    cache_sweeper.start();
    rate_limit_sweeper.start();

    if !config.rate_limit.trusted_proxies.is_empty() {
        info!("Trusting X-Forwarded-For from {:?}", config.rate_limit.trusted_proxies);
    }

    let app = build_router(state);

    let bind_address = args.bind.unwrap_or(config.bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("aviary-curator listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cache_sweeper.stop().await;
    rate_limit_sweeper.stop().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
