//! tfeed-fi (Feed Ingestor) - event consumer maintaining per-user feeds
//!
//! Starts the bus worker and a small HTTP surface for event publication and
//! health. Ctrl-C stops both gracefully; leased messages that were not acked
//! become visible again once their lease expires.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tfeed_common::bus::EventBus;
use tfeed_common::config::TomlConfig;
use tfeed_common::db::init_database;
use tfeed_common::FeedPolicy;
use tfeed_fi::{build_router, AppState, FeedIngestor, FeedWorker, DEFAULT_PORT};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "tfeed-fi", version, about = "Feed ingestor")]
struct Args {
    /// Path to TOML config file
    #[arg(long, env = "TFEED_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite database (overrides config file)
    #[arg(long, env = "TFEED_DATABASE")]
    database: Option<PathBuf>,

    /// HTTP port (overrides config file)
    #[arg(long, env = "TFEED_FI_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load config file")?;
    config
        .logging
        .init_tracing()
        .context("Failed to initialize logging")?;

    info!(
        "Starting tfeed Feed Ingestor (tfeed-fi) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &args.config {
        Some(path) if path.exists() => info!("Loaded configuration from {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => info!("No config file given, using defaults"),
    }

    let db_path = config.database_path(args.database);
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let policy = FeedPolicy::load(&pool)
        .await
        .context("Failed to load feed policy")?;
    info!(?policy, "Loaded feed policy");

    let bus = EventBus::new(pool.clone());
    let ingestor = Arc::new(FeedIngestor::sqlite(pool, policy));
    let cancel = CancellationToken::new();

    let worker = FeedWorker::new(bus.clone(), ingestor);
    let worker_handle = tokio::spawn(worker.run(cancel.clone()));

    let app = build_router(AppState::new(bus));
    let port = config.port(args.port, DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("tfeed-fi listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    if let Err(e) = worker_handle.await {
        warn!("Worker task ended abnormally: {}", e);
    }

    info!("tfeed-fi stopped");
    Ok(())
}
