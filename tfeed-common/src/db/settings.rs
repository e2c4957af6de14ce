//! Runtime settings stored in the `settings` table
//!
//! Missing or NULL values are reset to their built-in defaults so every
//! service reads the same policy from one place.

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{info, warn};

/// Built-in defaults for every runtime setting
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    // Feed policy
    ("feed_hydration_cap", "50"),
    ("feed_partition_cap", "12"),
    ("feed_evening_start_hour", "20"),
    ("feed_evening_end_hour", "3"),
    ("feed_reference_utc_offset_minutes", "60"),
    ("feed_rating_weight", "2"),
    // Event bus
    ("bus_batch_size", "5"),
    ("bus_visibility_timeout_secs", "60"),
    ("bus_poll_interval_ms", "1000"),
    ("bus_max_receive_count", "10"),
];

/// Initialize or repair default settings
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, value).await?;
    }
    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE: both services may initialize concurrently
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let repaired = sqlx::query(
        "UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ? AND value IS NULL",
    )
    .bind(default_value)
    .bind(key)
    .execute(pool)
    .await?
    .rows_affected();

    if repaired > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Write a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Read and parse a setting, falling back to `default` when absent
///
/// An unparseable stored value is a configuration error rather than a
/// silent fallback.
pub async fn get_parsed<T>(pool: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_setting(pool, key).await? {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| Error::Config(format!("Invalid value '{}' for setting '{}': {}", raw, key, e))),
        None => Ok(default),
    }
}
