//! SQLite feed ledger

use super::{FeedStore, ListenWrite};
use crate::db::models::{EntryType, FeedEntry, NewFeedEntry};
use crate::scoring::{LISTENING_REASON, SOURCE_LISTEN};
use crate::time::{now_millis, sort_key};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

/// Sort-key allocation attempts before giving up on an insert
const MAX_SORT_KEY_ATTEMPTS: usize = 64;

const ENTRY_COLUMNS: &str =
    "user_id, created_at, type, content_id, reason, score, timestamp, source";

/// Feed ledger stored in the `feed_entries` table
#[derive(Clone)]
pub struct SqliteFeedStore {
    pool: SqlitePool,
}

impl SqliteFeedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Next candidate sort key: wall clock, or one past the user's newest row
    async fn next_sort_millis(&self, user_id: &str) -> Result<i64> {
        let latest: Option<String> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM feed_entries WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let after_latest = latest
            .and_then(|key| key.parse::<i64>().ok())
            .map(|ms| ms + 1)
            .unwrap_or(0);
        Ok(now_millis().max(after_latest))
    }
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn insert(&self, entry: NewFeedEntry) -> Result<FeedEntry> {
        let mut millis = self.next_sort_millis(&entry.user_id).await?;

        for _ in 0..MAX_SORT_KEY_ATTEMPTS {
            let created_at = sort_key(millis);
            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO feed_entries
                    (user_id, created_at, type, content_id, reason, score, timestamp, source)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.user_id)
            .bind(&created_at)
            .bind(entry.entry_type.as_str())
            .bind(&entry.content_id)
            .bind(&entry.reason)
            .bind(entry.score)
            .bind(&entry.timestamp)
            .bind(&entry.source)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if inserted == 1 {
                debug!(
                    user_id = %entry.user_id,
                    content_id = %entry.content_id,
                    entry_type = %entry.entry_type,
                    score = entry.score,
                    created_at = %created_at,
                    "Inserted feed entry"
                );
                return Ok(FeedEntry {
                    user_id: entry.user_id,
                    created_at,
                    entry_type: entry.entry_type,
                    content_id: entry.content_id,
                    reason: entry.reason,
                    score: entry.score,
                    timestamp: entry.timestamp,
                    source: entry.source,
                });
            }

            // Another writer took this millisecond for the same user
            millis += 1;
        }

        Err(Error::Internal(format!(
            "No free sort key for user {} after {} attempts",
            entry.user_id, MAX_SORT_KEY_ATTEMPTS
        )))
    }

    async fn ledger(&self, user_id: &str) -> Result<Vec<FeedEntry>> {
        let entries = sqlx::query_as::<_, FeedEntry>(&format!(
            "SELECT {} FROM feed_entries WHERE user_id = ? ORDER BY created_at DESC",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn purge_content(&self, user_id: &str, content_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM feed_entries WHERE user_id = ? AND content_id = ?")
            .bind(user_id)
            .bind(content_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn purge_content_type(
        &self,
        user_id: &str,
        content_id: &str,
        entry_type: EntryType,
    ) -> Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM feed_entries WHERE user_id = ? AND content_id = ? AND type = ?",
        )
        .bind(user_id)
        .bind(content_id)
        .bind(entry_type.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }

    async fn purge_by_provenance(&self, user_id: &str, source: &str, needle: &str) -> Result<u64> {
        // instr() rather than LIKE: ids may contain % or _
        let deleted = sqlx::query(
            r#"
            DELETE FROM feed_entries
            WHERE user_id = ?
              AND (source = ? OR (? <> '' AND instr(reason, ?) > 0))
            "#,
        )
        .bind(user_id)
        .bind(source)
        .bind(needle)
        .bind(needle)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }

    async fn record_listen(
        &self,
        user_id: &str,
        song_id: &str,
        delta: i64,
        timestamp: &str,
    ) -> Result<ListenWrite> {
        let mut millis = self.next_sort_millis(user_id).await?;

        for _ in 0..MAX_SORT_KEY_ATTEMPTS {
            let created_at = sort_key(millis);
            // The conflict target must restate the partial index predicate
            // verbatim; a sort-key clash falls through to DO NOTHING.
            let written = sqlx::query_as::<_, FeedEntry>(&format!(
                r#"
                INSERT INTO feed_entries
                    (user_id, created_at, type, content_id, reason, score, timestamp, source)
                VALUES (?, ?, 'SONG', ?, '{reason}', ?, ?, ?)
                ON CONFLICT (user_id, content_id) WHERE reason = '{reason}'
                    DO UPDATE SET score = feed_entries.score + excluded.score,
                                  timestamp = excluded.timestamp
                ON CONFLICT DO NOTHING
                RETURNING {columns}
                "#,
                reason = LISTENING_REASON,
                columns = ENTRY_COLUMNS
            ))
            .bind(user_id)
            .bind(&created_at)
            .bind(song_id)
            .bind(delta)
            .bind(timestamp)
            .bind(SOURCE_LISTEN)
            .fetch_optional(&self.pool)
            .await?;

            match written {
                Some(entry) if entry.created_at == created_at && entry.score == delta => {
                    debug!(user_id, song_id, created_at = %created_at, "Inserted listening entry");
                    return Ok(ListenWrite::Inserted(entry));
                }
                Some(entry) => {
                    debug!(user_id, song_id, score = entry.score, "Accumulated listening entry");
                    return Ok(ListenWrite::Updated(entry));
                }
                // Another writer took this millisecond for the same user
                None => millis += 1,
            }
        }

        Err(Error::Internal(format!(
            "No free sort key for user {} after {} attempts",
            user_id, MAX_SORT_KEY_ATTEMPTS
        )))
    }
}
