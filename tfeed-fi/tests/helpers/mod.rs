//! Test Helper Utilities
//!
//! Shared fixtures for tfeed-fi integration tests: a temporary database,
//! catalog seeding, ledger inspection and a subscription index that fails
//! on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tfeed_common::db::{init_database, Album, Artist, EntryType, FeedEntry, Genre, Song, Subscription};
use tfeed_common::store::{FeedStore, SqliteCatalog, SqliteFeedStore, SubscriptionIndex};
use tfeed_common::{Error, FeedPolicy, Result};
use tfeed_fi::FeedIngestor;

pub struct TestEnv {
    /// Keeps the database directory alive for the test's duration
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub catalog: Arc<SqliteCatalog>,
    pub store: Arc<SqliteFeedStore>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("tfeed.db")).await.unwrap();
        Self {
            dir,
            catalog: Arc::new(SqliteCatalog::new(pool.clone())),
            store: Arc::new(SqliteFeedStore::new(pool.clone())),
            pool,
        }
    }

    pub fn ingestor(&self) -> FeedIngestor {
        self.ingestor_with(FeedPolicy::default())
    }

    pub fn ingestor_with(&self, policy: FeedPolicy) -> FeedIngestor {
        FeedIngestor::sqlite(self.pool.clone(), policy)
    }

    /// Ingestor whose subscription lookups fail for `failing_target`
    pub fn ingestor_failing_on(&self, failing_target: &str) -> FeedIngestor {
        let subscriptions = Arc::new(FailingSubscriptions {
            inner: self.catalog.clone(),
            failing_target: failing_target.to_string(),
        });
        FeedIngestor::new(
            self.store.clone(),
            subscriptions,
            self.catalog.clone(),
            self.catalog.clone(),
            FeedPolicy::default(),
        )
    }

    pub async fn subscribe(&self, user: &str, target: &str, target_type: &str) {
        self.catalog
            .put_subscription(&Subscription {
                user_id: user.into(),
                target_id: target.into(),
                target_type: target_type.into(),
            })
            .await
            .unwrap();
    }

    /// Genre `id` named `name` with `songs` songs, one album and one artist
    pub async fn seed_genre(&self, id: &str, name: &str, songs: usize) {
        self.catalog
            .put_genre(&Genre {
                id: id.into(),
                name: name.into(),
            })
            .await
            .unwrap();
        for i in 0..songs {
            self.catalog
                .put_song(&song(&format!("{}-s{}", id, i), &[id]))
                .await
                .unwrap();
        }
        self.catalog
            .put_album(&Album {
                id: format!("{}-al", id),
                title: format!("{} Collection", name),
                release_date: None,
                artist_ids: vec![format!("{}-ar", id)],
                genre_ids: vec![id.into()],
            })
            .await
            .unwrap();
        self.catalog
            .put_artist(&Artist {
                id: format!("{}-ar", id),
                name: format!("{} Ensemble", name),
                biography: None,
                genre_ids: vec![id.into()],
            })
            .await
            .unwrap();
    }

    pub async fn ledger(&self, user: &str) -> Vec<FeedEntry> {
        self.store.ledger(user).await.unwrap()
    }

    /// Summed score per `(contentId, type)`
    pub async fn scores(&self, user: &str) -> HashMap<(String, EntryType), i64> {
        let mut scores = HashMap::new();
        for entry in self.ledger(user).await {
            *scores.entry((entry.content_id, entry.entry_type)).or_insert(0) += entry.score;
        }
        scores
    }
}

pub fn song(id: &str, genre_ids: &[&str]) -> Song {
    Song {
        id: id.into(),
        title: format!("Song {}", id),
        artist_ids: vec!["a1".into()],
        genre_ids: genre_ids.iter().map(|g| g.to_string()).collect(),
        album_id: None,
        s3_key_cover: None,
        s3_key_audio: None,
        creation_date: None,
    }
}

pub fn key(content: &str, entry_type: EntryType) -> (String, EntryType) {
    (content.to_string(), entry_type)
}

/// Subscription index that times out for one target
pub struct FailingSubscriptions {
    inner: Arc<SqliteCatalog>,
    failing_target: String,
}

#[async_trait]
impl SubscriptionIndex for FailingSubscriptions {
    async fn subscribers(&self, target_id: &str) -> Result<Vec<Subscription>> {
        if target_id == self.failing_target {
            return Err(Error::Lookup(format!("subscription lookup timed out for {}", target_id)));
        }
        self.inner.subscribers(target_id).await
    }
}
