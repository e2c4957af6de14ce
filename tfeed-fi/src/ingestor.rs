//! Event application against the feed ledger
//!
//! Each domain event is turned into purges and inserts on the per-user
//! ledger. Mutations are either fresh inserts or deletes scoped to
//! `(user, content[, type])`, so concurrent batches and redelivery after a
//! partial failure converge without locks:
//!
//! - publish fans out additively (one entry per matching subscription)
//! - rating, retraction and subscription hydration purge before inserting
//! - listening upserts a single entry per `(user, song)` in one statement

use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tfeed_common::db::{EntryType, NewFeedEntry};
use tfeed_common::events::{decode, is_genre_target, Envelope};
use tfeed_common::scoring::{
    genre_reason, genre_source, hydration_score, map_rating, meta_score, publish_source,
    published_reason, published_score, rating_reason, subscribed_reason, subscription_source,
    LISTEN_SCORE, SOURCE_RATING,
};
use tfeed_common::store::{
    collect_genre_members, CatalogIndex, FeedStore, GenreDirectory, ListenWrite, SqliteCatalog,
    SqliteFeedStore, SubscriptionIndex,
};
use tfeed_common::time::now_iso;
use tfeed_common::{Error, FeedEvent, FeedPolicy, Result};
use tracing::{debug, info, warn};

/// How one bus message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Event applied to the ledger
    Applied,
    /// Well-formed envelope with an event type this engine does not consume
    Ignored,
    /// Malformed payload; dropped permanently
    Skipped,
    /// Transient failure; left on the bus for redelivery
    Retry,
}

impl Outcome {
    /// Whether the message should be removed from the bus
    pub fn should_ack(self) -> bool {
        !matches!(self, Outcome::Retry)
    }
}

/// Ledger mutations performed for one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub inserted: u64,
    pub purged: u64,
    pub updated: u64,
}

/// Applies feed events to the ledger
#[derive(Clone)]
pub struct FeedIngestor {
    feed: Arc<dyn FeedStore>,
    subscriptions: Arc<dyn SubscriptionIndex>,
    catalog: Arc<dyn CatalogIndex>,
    genres: Arc<dyn GenreDirectory>,
    policy: FeedPolicy,
}

impl FeedIngestor {
    pub fn new(
        feed: Arc<dyn FeedStore>,
        subscriptions: Arc<dyn SubscriptionIndex>,
        catalog: Arc<dyn CatalogIndex>,
        genres: Arc<dyn GenreDirectory>,
        policy: FeedPolicy,
    ) -> Self {
        Self {
            feed,
            subscriptions,
            catalog,
            genres,
            policy,
        }
    }

    /// Ingestor backed entirely by one SQLite database
    pub fn sqlite(pool: SqlitePool, policy: FeedPolicy) -> Self {
        let catalog = Arc::new(SqliteCatalog::new(pool.clone()));
        Self::new(
            Arc::new(SqliteFeedStore::new(pool)),
            catalog.clone(),
            catalog.clone(),
            catalog,
            policy,
        )
    }

    pub fn policy(&self) -> &FeedPolicy {
        &self.policy
    }

    /// Decode and apply one raw bus message, classifying the result
    pub async fn handle_message(&self, message_id: &str, body: &str) -> Outcome {
        let event = match decode(body) {
            Ok(Envelope::Known(event)) => event,
            Ok(Envelope::Unknown(event_type)) => {
                debug!(message_id, event_type = %event_type, "Ignoring unhandled event type");
                return Outcome::Ignored;
            }
            Err(e) => {
                warn!(message_id, "Skipping malformed event: {}", e);
                return Outcome::Skipped;
            }
        };

        match self.apply(&event).await {
            Ok(report) => {
                debug!(
                    message_id,
                    event_type = event.event_type(),
                    inserted = report.inserted,
                    purged = report.purged,
                    updated = report.updated,
                    "Applied event"
                );
                Outcome::Applied
            }
            Err(e @ (Error::MalformedEvent(_) | Error::InvalidInput(_))) => {
                warn!(message_id, event_type = event.event_type(), "Skipping event: {}", e);
                Outcome::Skipped
            }
            Err(e) => {
                warn!(
                    message_id,
                    event_type = event.event_type(),
                    transient = e.is_transient(),
                    "Event failed, leaving it for redelivery: {}",
                    e
                );
                Outcome::Retry
            }
        }
    }

    /// Apply one decoded event
    pub async fn apply(&self, event: &FeedEvent) -> Result<ApplyReport> {
        event.validate()?;

        match event {
            FeedEvent::ContentPublished {
                content_id,
                artist_ids,
                genre_ids,
                timestamp,
                ..
            } => {
                self.content_published(content_id, artist_ids, genre_ids, timestamp.as_deref())
                    .await
            }
            FeedEvent::ContentRated {
                user_id,
                content_id,
                rating_value,
            } => {
                self.content_rated(user_id, content_id, map_rating(rating_value))
                    .await
            }
            FeedEvent::RatingRetracted {
                user_id,
                content_id,
            } => self.rating_retracted(user_id, content_id).await,
            FeedEvent::UserSubscribed {
                user_id,
                target_id,
                target_type,
            } => self.user_subscribed(user_id, target_id, target_type).await,
            FeedEvent::UserUnsubscribed {
                user_id,
                target_id,
                target_type,
            } => self.user_unsubscribed(user_id, target_id, target_type).await,
            FeedEvent::SongListened { user_id, song_id } => {
                self.song_listened(user_id, song_id).await
            }
        }
    }

    /// Fan a new song out to subscribers of its genres and artists
    ///
    /// All subscriber lookups complete before the first write, so a failed
    /// lookup leaves nothing behind for the redelivery to duplicate.
    async fn content_published(
        &self,
        content_id: &str,
        artist_ids: &[String],
        genre_ids: &[String],
        timestamp: Option<&str>,
    ) -> Result<ApplyReport> {
        let mut seen = HashSet::new();
        let targets: Vec<(&str, bool)> = genre_ids
            .iter()
            .map(|id| (id.as_str(), true))
            .chain(artist_ids.iter().map(|id| (id.as_str(), false)))
            .filter(|(id, _)| !id.is_empty() && seen.insert(*id))
            .collect();

        let mut fan_out = Vec::with_capacity(targets.len());
        for (target_id, is_genre) in targets {
            let subscribers = self.subscriptions.subscribers(target_id).await?;
            fan_out.push((target_id, is_genre, subscribers));
        }

        let timestamp = timestamp
            .filter(|ts| !ts.is_empty())
            .map(str::to_string)
            .unwrap_or_else(now_iso);

        let mut report = ApplyReport::default();
        for (target_id, is_genre, subscribers) in fan_out {
            for subscription in subscribers {
                self.feed
                    .insert(NewFeedEntry {
                        user_id: subscription.user_id,
                        entry_type: EntryType::Song,
                        content_id: content_id.to_string(),
                        reason: published_reason(target_id),
                        score: published_score(is_genre),
                        timestamp: timestamp.clone(),
                        source: Some(publish_source(target_id)),
                    })
                    .await?;
                report.inserted += 1;
            }
        }

        if report.inserted > 0 {
            info!(content_id, entries = report.inserted, "Fanned out published content");
        }
        Ok(report)
    }

    /// Replace the user's feed contribution for `content_id` with one rating entry
    async fn content_rated(&self, user_id: &str, content_id: &str, stars: i64) -> Result<ApplyReport> {
        let mut report = ApplyReport {
            purged: self.feed.purge_content(user_id, content_id).await?,
            ..Default::default()
        };

        if stars > 0 {
            self.feed
                .insert(NewFeedEntry {
                    user_id: user_id.to_string(),
                    entry_type: EntryType::Song,
                    content_id: content_id.to_string(),
                    reason: rating_reason(stars),
                    score: stars * self.policy.rating_weight,
                    timestamp: now_iso(),
                    source: Some(SOURCE_RATING.to_string()),
                })
                .await?;
            report.inserted = 1;
        }
        Ok(report)
    }

    async fn rating_retracted(&self, user_id: &str, content_id: &str) -> Result<ApplyReport> {
        Ok(ApplyReport {
            purged: self.feed.purge_content(user_id, content_id).await?,
            ..Default::default()
        })
    }

    /// Record the subscription and, for genres, hydrate existing catalog content
    async fn user_subscribed(
        &self,
        user_id: &str,
        target_id: &str,
        target_type: &str,
    ) -> Result<ApplyReport> {
        let is_genre = is_genre_target(target_type);

        // One META entry per subscription even when the event is redelivered
        let mut report = ApplyReport {
            purged: self
                .feed
                .purge_content_type(user_id, target_id, EntryType::Meta)
                .await?,
            ..Default::default()
        };
        self.feed
            .insert(NewFeedEntry {
                user_id: user_id.to_string(),
                entry_type: EntryType::Meta,
                content_id: target_id.to_string(),
                reason: subscribed_reason(target_type, target_id),
                score: meta_score(is_genre),
                timestamp: now_iso(),
                source: Some(subscription_source(target_id)),
            })
            .await?;
        report.inserted += 1;

        if !is_genre {
            return Ok(report);
        }

        let Some(genre_name) = self.genres.genre_name(target_id).await? else {
            warn!(user_id, genre_id = target_id, "Genre not found, skipping hydration");
            return Ok(report);
        };

        let members =
            collect_genre_members(self.catalog.as_ref(), &genre_name, self.policy.hydration_cap)
                .await?;
        let timestamp = now_iso();
        for member in &members {
            report.purged += self
                .feed
                .purge_content_type(user_id, &member.entity_id, member.entity_type)
                .await?;
            self.feed
                .insert(NewFeedEntry {
                    user_id: user_id.to_string(),
                    entry_type: member.entity_type,
                    content_id: member.entity_id.clone(),
                    reason: genre_reason(&genre_name),
                    score: hydration_score(member.entity_type),
                    timestamp: timestamp.clone(),
                    source: Some(genre_source(target_id)),
                })
                .await?;
            report.inserted += 1;
        }

        info!(
            user_id,
            genre = %genre_name,
            hydrated = members.len(),
            "Hydrated feed from genre subscription"
        );
        Ok(report)
    }

    /// Remove the subscription record and everything genre hydration produced
    async fn user_unsubscribed(
        &self,
        user_id: &str,
        target_id: &str,
        target_type: &str,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport {
            purged: self
                .feed
                .purge_content_type(user_id, target_id, EntryType::Meta)
                .await?,
            ..Default::default()
        };

        if !is_genre_target(target_type) {
            return Ok(report);
        }

        match self.genres.genre_name(target_id).await? {
            Some(genre_name) => {
                let members = collect_genre_members(
                    self.catalog.as_ref(),
                    &genre_name,
                    self.policy.hydration_cap,
                )
                .await?;
                for member in &members {
                    report.purged += self
                        .feed
                        .purge_content_type(user_id, &member.entity_id, member.entity_type)
                        .await?;
                }
                // Rows hydrated from members that have since left the genre
                report.purged += self
                    .feed
                    .purge_by_provenance(user_id, &genre_source(target_id), "")
                    .await?;
            }
            None => {
                warn!(
                    user_id,
                    genre_id = target_id,
                    "Genre name unresolved, falling back to provenance cleanup"
                );
                report.purged += self
                    .feed
                    .purge_by_provenance(user_id, &genre_source(target_id), target_id)
                    .await?;
            }
        }
        Ok(report)
    }

    /// Accumulate plays on the single listening entry for `(user, song)`
    async fn song_listened(&self, user_id: &str, song_id: &str) -> Result<ApplyReport> {
        let written = self
            .feed
            .record_listen(user_id, song_id, LISTEN_SCORE, &now_iso())
            .await?;
        Ok(match written {
            ListenWrite::Inserted(_) => ApplyReport {
                inserted: 1,
                ..Default::default()
            },
            ListenWrite::Updated(_) => ApplyReport {
                updated: 1,
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_retry_is_left_unacked() {
        assert!(Outcome::Applied.should_ack());
        assert!(Outcome::Ignored.should_ack());
        assert!(Outcome::Skipped.should_ack());
        assert!(!Outcome::Retry.should_ack());
    }
}
