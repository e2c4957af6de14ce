//! Batch worker draining the event bus into the ingestor

use crate::ingestor::{FeedIngestor, Outcome};
use futures::future::join_all;
use std::sync::Arc;
use tfeed_common::bus::{BusMessage, EventBus};
use tfeed_common::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-batch tally of message outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub applied: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub retried: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Ignored => self.ignored += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Retry => self.retried += 1,
        }
    }
}

/// Leases batches from the bus and applies them concurrently
pub struct FeedWorker {
    bus: EventBus,
    ingestor: Arc<FeedIngestor>,
}

impl FeedWorker {
    pub fn new(bus: EventBus, ingestor: Arc<FeedIngestor>) -> Self {
        Self { bus, ingestor }
    }

    /// Lease one batch, process every message concurrently, ack per outcome
    ///
    /// A message that outlives its lease is treated as a retry: the bus has
    /// already made it visible again, so acking it would race the redelivery.
    pub async fn process_batch(&self) -> Result<BatchSummary> {
        let policy = self.ingestor.policy();
        let visibility = policy.visibility_timeout();
        let messages = self
            .bus
            .receive_batch(policy.batch_size, visibility, policy.max_receive_count)
            .await?;

        let outcomes = join_all(messages.iter().map(|message| async move {
            match tokio::time::timeout(visibility, self.handle(message)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(message_id = %message.id, "Processing exceeded lease, leaving for redelivery");
                    Outcome::Retry
                }
            }
        }))
        .await;

        let mut summary = BatchSummary {
            received: messages.len(),
            ..Default::default()
        };
        for (message, outcome) in messages.iter().zip(outcomes) {
            summary.record(outcome);
            if !outcome.should_ack() {
                continue;
            }
            if let Err(e) = self.bus.ack(&message.id).await {
                // Redelivery re-runs an idempotent sequence
                warn!(message_id = %message.id, "Failed to ack message: {}", e);
            }
        }

        Ok(summary)
    }

    async fn handle(&self, message: &BusMessage) -> Outcome {
        self.ingestor.handle_message(&message.id, &message.body).await
    }

    /// Run until cancelled
    ///
    /// Full batches are followed immediately by the next receive; an empty
    /// bus waits for a publish notification or the poll interval.
    pub async fn run(self, cancel: CancellationToken) {
        let poll_interval = self.ingestor.policy().poll_interval();
        info!(
            batch_size = self.ingestor.policy().batch_size,
            poll_ms = poll_interval.as_millis() as u64,
            "Feed worker started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.process_batch().await {
                Ok(summary) if summary.received > 0 => {
                    info!(
                        received = summary.received,
                        applied = summary.applied,
                        ignored = summary.ignored,
                        skipped = summary.skipped,
                        retried = summary.retried,
                        "Processed batch"
                    );
                    if summary.retried < summary.received {
                        continue;
                    }
                }
                Ok(_) => {}
                Err(e) => error!("Failed to receive batch: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.bus.published() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Feed worker stopped");
    }
}
