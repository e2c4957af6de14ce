//! tfeed-fr (Feed Reader) - ranked per-user feed over HTTP

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tfeed_common::config::TomlConfig;
use tfeed_common::db::init_database;
use tfeed_common::signer::MediaUrlSigner;
use tfeed_common::FeedPolicy;
use tfeed_fr::{build_router, AppState, FeedReader, DEFAULT_PORT};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "tfeed-fr", version, about = "Feed reader")]
struct Args {
    /// Path to TOML config file
    #[arg(long, env = "TFEED_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite database (overrides config file)
    #[arg(long, env = "TFEED_DATABASE")]
    database: Option<PathBuf>,

    /// HTTP port (overrides config file)
    #[arg(long, env = "TFEED_FR_PORT")]
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
        "Starting tfeed Feed Reader (tfeed-fr) v{} [{}] built {} ({})",
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
    info!(
        partition_cap = policy.partition_cap,
        evening_start = policy.evening_start_hour,
        evening_end = policy.evening_end_hour,
        "Loaded feed policy"
    );

    let mut reader = FeedReader::sqlite(pool, policy);
    let media = &config.media;
    if media.signing_secret.is_empty() {
        warn!("Media signing secret not set; songs are served without media URLs");
    } else {
        let signer = MediaUrlSigner::new(&media.base_url, &media.signing_secret, media.url_ttl());
        reader = reader.with_signer(Arc::new(signer), &media.bucket);
        info!("Signing media URLs for bucket {}", media.bucket);
    }

    let app = build_router(AppState::new(reader));
    let port = config.port(args.port, DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("tfeed-fr listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    info!("tfeed-fr stopped");
    Ok(())
}
