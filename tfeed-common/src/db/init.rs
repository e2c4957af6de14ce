//! Database initialization
//!
//! Creates the database file on first run and brings every table to the
//! current schema. All statements are idempotent, so both services may run
//! this at startup against the same file.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Applied per connection, so every pooled writer waits on a locked database
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_settings_table(&pool).await?;
    create_feed_entries_table(&pool).await?;
    create_subscriptions_table(&pool).await?;
    create_genres_table(&pool).await?;
    create_genre_catalog_table(&pool).await?;
    create_songs_table(&pool).await?;
    create_albums_table(&pool).await?;
    create_artists_table(&pool).await?;
    create_bus_tables(&pool).await?;

    crate::db::settings::init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create the settings table
///
/// Stores runtime policy as key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the per-user feed ledger
///
/// `(user_id, created_at)` is the row identity. The composite
/// `(user_id, content_id, type)` index backs every purge; a partial unique
/// index is the conflict target for listening-activity upserts.
pub async fn create_feed_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feed_entries (
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('SONG', 'ALBUM', 'ARTIST', 'META')),
            content_id TEXT NOT NULL,
            reason TEXT NOT NULL DEFAULT '',
            score INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            source TEXT,
            PRIMARY KEY (user_id, created_at)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_feed_entries_content ON feed_entries(user_id, content_id, type)",
    )
    .execute(pool)
    .await?;

    // One accumulating listening entry per (user, song)
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_feed_entries_listening \
         ON feed_entries(user_id, content_id) WHERE reason = '{}'",
        crate::scoring::LISTENING_REASON
    ))
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_subscriptions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            target_type TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (user_id, target_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscriptions_target ON subscriptions(target_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_genres_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genres (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_genre_catalog_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genre_catalog (
            genre_name TEXT NOT NULL,
            entity_key TEXT NOT NULL,
            entity_type TEXT NOT NULL CHECK (entity_type IN ('SONG', 'ALBUM', 'ARTIST')),
            entity_id TEXT NOT NULL,
            title TEXT,
            name TEXT,
            PRIMARY KEY (genre_name, entity_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            artist_ids TEXT NOT NULL DEFAULT '[]',
            genre_ids TEXT NOT NULL DEFAULT '[]',
            album_id TEXT,
            s3_key_cover TEXT,
            s3_key_audio TEXT,
            creation_date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_albums_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            release_date TEXT,
            artist_ids TEXT NOT NULL DEFAULT '[]',
            genre_ids TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            biography TEXT,
            genre_ids TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the event bus queue and its dead-letter table
pub async fn create_bus_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bus_messages (
            id TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL,
            visible_at INTEGER NOT NULL,
            receive_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bus_messages_visible ON bus_messages(visible_at, enqueued_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bus_dead_letters (
            id TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL,
            receive_count INTEGER NOT NULL,
            dead_lettered_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
