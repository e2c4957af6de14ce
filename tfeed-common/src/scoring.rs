//! Scoring policy shared by the ingestor and the reader
//!
//! Every score is a fixed integer contribution of one event. Scores are only
//! summed when the reader groups a ledger; the listening-activity row is the
//! single exception that accumulates in place.

use crate::db::models::EntryType;
use crate::db::settings::get_parsed;
use crate::Result;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;

/// New song published under a subscribed genre
pub const PUBLISHED_GENRE_SCORE: i64 = 5;
/// New song published by a subscribed artist
pub const PUBLISHED_ARTIST_SCORE: i64 = 8;
/// Subscription notification for a genre target
pub const META_GENRE_SCORE: i64 = 3;
/// Subscription notification for any other target
pub const META_OTHER_SCORE: i64 = 4;
/// First listen of a song
pub const LISTEN_SCORE: i64 = 1;
/// Flat bonus for listening activity in the evening window
pub const EVENING_BONUS: i64 = 1;

/// Reason carried by the per-song listening row; the reader matches it exactly
pub const LISTENING_REASON: &str = "Listening activity";

pub const SOURCE_RATING: &str = "rating";
pub const SOURCE_LISTEN: &str = "listen";

/// Score for an entity pulled in by genre hydration
pub fn hydration_score(entity_type: EntryType) -> i64 {
    match entity_type {
        EntryType::Song => 4,
        EntryType::Album => 3,
        EntryType::Artist => 2,
        EntryType::Meta => 0,
    }
}

/// Score for a subscription notification
pub fn meta_score(target_is_genre: bool) -> i64 {
    if target_is_genre {
        META_GENRE_SCORE
    } else {
        META_OTHER_SCORE
    }
}

/// Score for a publish fanned out through one subscribed target
pub fn published_score(target_is_genre: bool) -> i64 {
    if target_is_genre {
        PUBLISHED_GENRE_SCORE
    } else {
        PUBLISHED_ARTIST_SCORE
    }
}

/// Map a raw rating onto the 1..=3 scale
///
/// Words: `love` = 3, `like` = 2, `dislike` = 0. Integers inside 1..=3 are
/// kept as-is. Anything else maps to 0, which the ingestor treats as
/// "remove only".
pub fn map_rating(raw: &serde_json::Value) -> i64 {
    match raw {
        serde_json::Value::String(word) => match word.trim().to_ascii_lowercase().as_str() {
            "love" => 3,
            "like" => 2,
            "dislike" => 0,
            other => other.parse::<i64>().map(clamp_stars).unwrap_or(0),
        },
        serde_json::Value::Number(n) => n.as_i64().map(clamp_stars).unwrap_or(0),
        _ => 0,
    }
}

fn clamp_stars(value: i64) -> i64 {
    if (1..=3).contains(&value) {
        value
    } else {
        0
    }
}

pub fn rating_reason(stars: i64) -> String {
    format!("Rated song {}★", stars)
}

pub fn genre_reason(genre_name: &str) -> String {
    format!("Connected by genre: {}", genre_name)
}

pub fn published_reason(target_id: &str) -> String {
    format!("New content for {}", target_id)
}

pub fn subscribed_reason(target_type: &str, target_id: &str) -> String {
    format!("Subscribed to {} {}", target_type, target_id)
}

pub fn genre_source(genre_id: &str) -> String {
    format!("genre:{}", genre_id)
}

pub fn subscription_source(target_id: &str) -> String {
    format!("subscription:{}", target_id)
}

pub fn publish_source(target_id: &str) -> String {
    format!("publish:{}", target_id)
}

/// Tunable feed policy, loaded from the `settings` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPolicy {
    /// Maximum catalog entities hydrated per genre subscription
    pub hydration_cap: usize,
    /// Maximum recommendations returned per partition
    pub partition_cap: usize,
    /// Evening window start hour (inclusive) in the reference timezone
    pub evening_start_hour: u32,
    /// Evening window end hour (exclusive); may wrap past midnight
    pub evening_end_hour: u32,
    pub reference_utc_offset_minutes: i32,
    pub rating_weight: i64,
    pub batch_size: usize,
    pub visibility_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_receive_count: i64,
}

impl Default for FeedPolicy {
    fn default() -> Self {
        Self {
            hydration_cap: 50,
            partition_cap: 12,
            evening_start_hour: 20,
            evening_end_hour: 3,
            reference_utc_offset_minutes: 60,
            rating_weight: 2,
            batch_size: 5,
            visibility_timeout_secs: 60,
            poll_interval_ms: 1000,
            max_receive_count: 10,
        }
    }
}

impl FeedPolicy {
    /// Load policy from the database, using built-in defaults for absent keys
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let d = Self::default();
        let policy = Self {
            hydration_cap: get_parsed(pool, "feed_hydration_cap", d.hydration_cap).await?,
            partition_cap: get_parsed(pool, "feed_partition_cap", d.partition_cap).await?,
            evening_start_hour: get_parsed(pool, "feed_evening_start_hour", d.evening_start_hour)
                .await?
                % 24,
            evening_end_hour: get_parsed(pool, "feed_evening_end_hour", d.evening_end_hour).await?
                % 24,
            reference_utc_offset_minutes: get_parsed(
                pool,
                "feed_reference_utc_offset_minutes",
                d.reference_utc_offset_minutes,
            )
            .await?,
            rating_weight: get_parsed(pool, "feed_rating_weight", d.rating_weight).await?,
            batch_size: get_parsed(pool, "bus_batch_size", d.batch_size).await?.max(1),
            visibility_timeout_secs: get_parsed(
                pool,
                "bus_visibility_timeout_secs",
                d.visibility_timeout_secs,
            )
            .await?,
            poll_interval_ms: get_parsed(pool, "bus_poll_interval_ms", d.poll_interval_ms).await?,
            max_receive_count: get_parsed(pool, "bus_max_receive_count", d.max_receive_count)
                .await?,
        };
        Ok(policy)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Out-of-range offsets fall back to UTC
    fn reference_offset(&self) -> FixedOffset {
        self.reference_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Whether `ts` falls inside the evening window in the reference timezone
    pub fn is_evening(&self, ts: DateTime<Utc>) -> bool {
        let hour = ts.with_timezone(&self.reference_offset()).hour();
        let (start, end) = (self.evening_start_hour, self.evening_end_hour);
        if start == end {
            false
        } else if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}
