//! Durable at-least-once event bus
//!
//! A lease queue on top of SQLite. Receiving a message hides it for the
//! visibility timeout; a consumer that finishes acknowledges (deletes) it,
//! and a consumer that crashes or gives up simply lets the lease expire so
//! the message is delivered again. Redelivery is the normal retry path.

use crate::events::FeedEvent;
use crate::time::now_millis;
use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

/// One leased message
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub id: String,
    pub body: String,
    /// Deliveries so far, including this one
    pub receive_count: i64,
}

/// SQLite-backed event bus shared by publishers and the ingestor worker
#[derive(Clone)]
pub struct EventBus {
    pool: SqlitePool,
    notify: Arc<Notify>,
}

impl EventBus {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Enqueue a raw envelope; returns the message id
    pub async fn publish(&self, body: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_millis();

        sqlx::query(
            "INSERT INTO bus_messages (id, body, enqueued_at, visible_at, receive_count) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&id)
        .bind(body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(message_id = %id, "Published bus message");
        self.notify.notify_one();
        Ok(id)
    }

    /// Serialize and enqueue a typed event
    pub async fn publish_event(&self, event: &FeedEvent) -> Result<String> {
        let body = serde_json::to_string(event)
            .map_err(|e| Error::Internal(format!("Failed to serialize event: {}", e)))?;
        self.publish(&body).await
    }

    /// Lease up to `max` visible messages in enqueue order
    ///
    /// Messages already delivered `max_receive_count` times without being
    /// acknowledged are moved to the dead-letter table instead.
    pub async fn receive_batch(
        &self,
        max: usize,
        visibility: Duration,
        max_receive_count: i64,
    ) -> Result<Vec<BusMessage>> {
        let now = now_millis();
        self.dead_letter_exhausted(now, max_receive_count).await?;

        let lease_until = now + visibility.as_millis() as i64;
        let rows = sqlx::query(
            r#"
            UPDATE bus_messages
            SET visible_at = ?, receive_count = receive_count + 1
            WHERE id IN (
                SELECT id FROM bus_messages
                WHERE visible_at <= ?
                ORDER BY enqueued_at, rowid
                LIMIT ?
            )
            RETURNING id, body, receive_count, enqueued_at, rowid AS seq
            "#,
        )
        .bind(lease_until)
        .bind(now)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut leased: Vec<(i64, i64, BusMessage)> = rows
            .iter()
            .map(|row| {
                (
                    row.get::<i64, _>("enqueued_at"),
                    row.get::<i64, _>("seq"),
                    BusMessage {
                        id: row.get("id"),
                        body: row.get("body"),
                        receive_count: row.get("receive_count"),
                    },
                )
            })
            .collect();
        // RETURNING order is unspecified
        leased.sort_by_key(|(enqueued_at, seq, _)| (*enqueued_at, *seq));

        Ok(leased.into_iter().map(|(_, _, message)| message).collect())
    }

    async fn dead_letter_exhausted(&self, now: i64, max_receive_count: i64) -> Result<()> {
        if max_receive_count <= 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let moved = sqlx::query(
            r#"
            INSERT OR REPLACE INTO bus_dead_letters (id, body, enqueued_at, receive_count, dead_lettered_at)
            SELECT id, body, enqueued_at, receive_count, ?
            FROM bus_messages
            WHERE visible_at <= ? AND receive_count >= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(max_receive_count)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if moved > 0 {
            sqlx::query("DELETE FROM bus_messages WHERE visible_at <= ? AND receive_count >= ?")
                .bind(now)
                .bind(max_receive_count)
                .execute(&mut *tx)
                .await?;
            warn!(
                count = moved,
                max_receive_count, "Moved undeliverable messages to dead-letter table"
            );
        }

        tx.commit().await?;
        Ok(())
    }

    /// Acknowledge a processed message; returns false if it was already gone
    pub async fn ack(&self, id: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM bus_messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Messages still on the queue, leased or not
    pub async fn pending_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM bus_messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn dead_letter_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM bus_dead_letters")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Wait until something is published in this process
    pub async fn published(&self) {
        self.notify.notified().await
    }
}
