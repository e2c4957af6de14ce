//! Bootstrap configuration
//!
//! The TOML file carries only what is needed before the database is open
//! (database path, port, logging, media signing). Feed policy lives in the
//! `settings` table, see [`crate::scoring::FeedPolicy`].
//!
//! Resolution priority for each value:
//! 1. Command-line argument / environment variable (handled by clap)
//! 2. TOML config file
//! 3. Compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP port; each service has its own default
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub media: MediaConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Install the global tracing subscriber
    ///
    /// `RUST_LOG` wins over the configured level. With a log file set,
    /// output is appended there without ANSI colors.
    pub fn init_tracing(&self) -> Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        match &self.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                builder
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .try_init()
            }
            None => builder.try_init(),
        }
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Media storage and URL signing
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_base_url")]
    pub base_url: String,

    #[serde(default = "default_media_bucket")]
    pub bucket: String,

    /// Shared with the media server; empty disables signed URLs
    #[serde(default)]
    pub signing_secret: String,

    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            base_url: default_media_base_url(),
            bucket: default_media_bucket(),
            signing_secret: String::new(),
            url_ttl_secs: default_url_ttl_secs(),
        }
    }
}

impl MediaConfig {
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_media_base_url() -> String {
    "http://127.0.0.1:5792/media".to_string()
}

fn default_media_bucket() -> String {
    "songs-media".to_string()
}

fn default_url_ttl_secs() -> u64 {
    3600
}

impl TomlConfig {
    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load the config file if one is given and present
    ///
    /// A missing file is not fatal: the service starts on defaults. A file
    /// that exists but cannot be parsed is an error. Runs before logging is
    /// initialized, so the caller reports which source was used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                Self::parse(&content)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Database path: override, then TOML, then the platform default
    pub fn database_path(&self, cli_override: Option<PathBuf>) -> PathBuf {
        cli_override
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(default_database_path)
    }

    /// Port: override, then TOML, then the service default
    pub fn port(&self, cli_override: Option<u16>, service_default: u16) -> u16 {
        cli_override.or(self.port).unwrap_or(service_default)
    }
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tfeed"))
        .unwrap_or_else(|| PathBuf::from("./tfeed_data"))
        .join("tfeed.db")
}
