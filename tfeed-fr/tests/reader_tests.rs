//! Feed reads over ledgers produced by the ingestor
//!
//! Tests cover:
//! - Subscription, rating, unsubscribe and listen scenarios end to end
//! - Dropping recommendations for deleted or unreadable content
//! - Ranking determinism
//! - Signed media URLs on songs

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tfeed_common::db::{init_database, Album, Artist, Genre, Song, Subscription};
use tfeed_common::signer::MediaUrlSigner;
use tfeed_common::store::{ContentLookup, SqliteCatalog, SqliteFeedStore};
use tfeed_common::{Error, FeedEvent, FeedPolicy, Result};
use tfeed_fi::FeedIngestor;
use tfeed_fr::{FeedItem, FeedReader};

struct TestEnv {
    _dir: TempDir,
    pool: sqlx::SqlitePool,
    catalog: Arc<SqliteCatalog>,
    ingestor: FeedIngestor,
}

/// Evening window disabled so bonus-free scores are independent of wall-clock time
fn daytime_policy() -> FeedPolicy {
    FeedPolicy {
        evening_start_hour: 0,
        evening_end_hour: 0,
        ..FeedPolicy::default()
    }
}

impl TestEnv {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("tfeed.db")).await.unwrap();
        Self {
            _dir: dir,
            catalog: Arc::new(SqliteCatalog::new(pool.clone())),
            ingestor: FeedIngestor::sqlite(pool.clone(), FeedPolicy::default()),
            pool,
        }
    }

    fn reader(&self) -> FeedReader {
        FeedReader::sqlite(self.pool.clone(), daytime_policy())
    }

    async fn apply(&self, event: serde_json::Value) {
        let event: FeedEvent = serde_json::from_value(event).unwrap();
        self.ingestor.apply(&event).await.unwrap();
    }

    async fn put_song(&self, id: &str, genre_ids: &[&str]) {
        self.catalog.put_song(&song(id, genre_ids)).await.unwrap();
    }

    async fn put_artist(&self, id: &str, genre_ids: &[&str]) {
        self.catalog
            .put_artist(&Artist {
                id: id.into(),
                name: format!("Artist {}", id),
                biography: None,
                genre_ids: genre_ids.iter().map(|g| g.to_string()).collect(),
            })
            .await
            .unwrap();
    }

    async fn subscribe_index(&self, user: &str, target: &str, target_type: &str) {
        self.catalog
            .put_subscription(&Subscription {
                user_id: user.into(),
                target_id: target.into(),
                target_type: target_type.into(),
            })
            .await
            .unwrap();
    }
}

fn song(id: &str, genre_ids: &[&str]) -> Song {
    Song {
        id: id.into(),
        title: format!("Song {}", id),
        artist_ids: vec!["a1".into()],
        genre_ids: genre_ids.iter().map(|g| g.to_string()).collect(),
        album_id: None,
        s3_key_cover: Some(format!("{}/cover/front.jpg", id)),
        s3_key_audio: Some(format!("{}/audio/track.mp3", id)),
        creation_date: None,
    }
}

fn summary(items: &[FeedItem]) -> Vec<(String, i64)> {
    items
        .iter()
        .map(|item| (item.content_id().to_string(), item.score()))
        .collect()
}

#[tokio::test]
async fn test_artist_subscription_and_publish_scenario() {
    let env = TestEnv::new().await;
    env.put_artist("a1", &[]).await;
    env.put_song("s1", &[]).await;
    env.subscribe_index("u1", "a1", "artist").await;

    env.apply(json!({"eventType": "user_subscribed", "userId": "u1", "targetId": "a1", "targetType": "artist"}))
        .await;
    env.apply(json!({"eventType": "content_published", "contentId": "s1", "artistIds": ["a1"]}))
        .await;

    let feed = env.reader().read("u1").await.unwrap();
    assert_eq!(summary(&feed.artists), vec![("a1".to_string(), 4)]);
    assert_eq!(summary(&feed.songs), vec![("s1".to_string(), 8)]);
    assert!(feed.albums.is_empty());
}

#[tokio::test]
async fn test_rating_replace_law() {
    let env = TestEnv::new().await;
    env.put_song("c1", &[]).await;

    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "c1", "ratingValue": "like"}))
        .await;
    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "c1", "ratingValue": "love"}))
        .await;

    let feed = env.reader().read("u1").await.unwrap();
    assert_eq!(summary(&feed.songs), vec![("c1".to_string(), 6)]);
}

#[tokio::test]
async fn test_rate_then_retract_shows_nothing() {
    let env = TestEnv::new().await;
    env.put_song("c1", &[]).await;

    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "c1", "ratingValue": "love"}))
        .await;
    env.apply(json!({"eventType": "rating_retracted", "userId": "u1", "contentId": "c1"}))
        .await;

    let feed = env.reader().read("u1").await.unwrap();
    assert!(feed.songs.is_empty());
}

#[tokio::test]
async fn test_genre_unsubscribe_removes_hydrated_recommendations() {
    let env = TestEnv::new().await;
    env.catalog
        .put_genre(&Genre {
            id: "g1".into(),
            name: "Jazz".into(),
        })
        .await
        .unwrap();
    env.put_song("s1", &["g1"]).await;
    env.put_song("s2", &["g1"]).await;
    env.put_artist("a7", &["g1"]).await;
    env.catalog
        .put_album(&Album {
            id: "al1".into(),
            title: "Kind of Jazz".into(),
            release_date: None,
            artist_ids: vec!["a7".into()],
            genre_ids: vec!["g1".into()],
        })
        .await
        .unwrap();

    env.apply(json!({"eventType": "user_subscribed", "userId": "u1", "targetId": "g1", "targetType": "genre"}))
        .await;
    let feed = env.reader().read("u1").await.unwrap();
    // Equal scores keep ledger order, newest first
    assert_eq!(
        summary(&feed.songs),
        vec![("s2".to_string(), 4), ("s1".to_string(), 4)]
    );
    assert_eq!(summary(&feed.albums), vec![("al1".to_string(), 3)]);
    // The genre's META entry has no artist record to render
    assert_eq!(summary(&feed.artists), vec![("a7".to_string(), 2)]);

    env.apply(json!({"eventType": "user_unsubscribed", "userId": "u1", "targetId": "g1", "targetType": "genre"}))
        .await;
    let feed = env.reader().read("u1").await.unwrap();
    assert!(feed.songs.is_empty());
    assert!(feed.albums.is_empty());
    assert!(feed.artists.is_empty());
}

#[tokio::test]
async fn test_listens_collapse_into_one_group() {
    let env = TestEnv::new().await;
    env.put_song("s1", &[]).await;

    for _ in 0..3 {
        env.apply(json!({"eventType": "song_listened", "userId": "u1", "songId": "s1"}))
            .await;
    }

    let feed = env.reader().read("u1").await.unwrap();
    assert_eq!(summary(&feed.songs), vec![("s1".to_string(), 3)]);
}

#[tokio::test]
async fn test_deleted_content_is_dropped() {
    let env = TestEnv::new().await;
    env.put_song("s1", &[]).await;
    env.put_song("s2", &[]).await;

    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "s1", "ratingValue": 1}))
        .await;
    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "s2", "ratingValue": 3}))
        .await;
    assert!(env.catalog.delete_song("s2").await.unwrap());

    let feed = env.reader().read("u1").await.unwrap();
    assert_eq!(summary(&feed.songs), vec![("s1".to_string(), 2)]);
}

#[tokio::test]
async fn test_consecutive_reads_are_identical() {
    let env = TestEnv::new().await;
    for i in 0..8 {
        let id = format!("s{}", i);
        env.put_song(&id, &[]).await;
        env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": id, "ratingValue": (i % 3) + 1}))
            .await;
    }

    let reader = env.reader();
    let first = reader.read("u1").await.unwrap();
    let second = reader.read("u1").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.songs.len(), 8);
}

#[tokio::test]
async fn test_unknown_user_gets_empty_feed() {
    let env = TestEnv::new().await;
    let feed = env.reader().read("nobody").await.unwrap();
    assert!(feed.songs.is_empty() && feed.albums.is_empty() && feed.artists.is_empty());
}

#[tokio::test]
async fn test_songs_carry_signed_media_urls() {
    let env = TestEnv::new().await;
    env.put_song("s1", &[]).await;
    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "s1", "ratingValue": "love"}))
        .await;

    let signer = MediaUrlSigner::new("http://media.test", "secret", Duration::from_secs(300));
    let reader = env.reader().with_signer(Arc::new(signer), "songs-media");
    let feed = reader.read("u1").await.unwrap();

    let value = serde_json::to_value(&feed.songs[0]).unwrap();
    assert_eq!(value["type"], "SONG");
    assert_eq!(value["song"]["id"], "s1");
    let audio = value["song"]["audioUrl"].as_str().unwrap();
    assert!(audio.starts_with("http://media.test/songs-media/s1/audio/track.mp3?expires="));
    assert!(audio.contains("&signature="));
    assert!(value["song"]["coverUrl"].as_str().is_some());
}

/// Content lookup that fails for one song id
struct FlakyContent {
    inner: SqliteCatalog,
    failing_id: String,
}

#[async_trait]
impl ContentLookup for FlakyContent {
    async fn song(&self, id: &str) -> Result<Option<Song>> {
        if id == self.failing_id {
            return Err(Error::Lookup(format!("song service unavailable for {}", id)));
        }
        self.inner.song(id).await
    }

    async fn album(&self, id: &str) -> Result<Option<Album>> {
        self.inner.album(id).await
    }

    async fn artist(&self, id: &str) -> Result<Option<Artist>> {
        self.inner.artist(id).await
    }
}

#[tokio::test]
async fn test_lookup_failure_drops_only_that_entity() {
    let env = TestEnv::new().await;
    env.put_song("s1", &[]).await;
    env.put_song("s2", &[]).await;
    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "s1", "ratingValue": "like"}))
        .await;
    env.apply(json!({"eventType": "content_rated", "userId": "u1", "contentId": "s2", "ratingValue": "love"}))
        .await;

    let reader = FeedReader::new(
        Arc::new(SqliteFeedStore::new(env.pool.clone())),
        Arc::new(FlakyContent {
            inner: SqliteCatalog::new(env.pool.clone()),
            failing_id: "s2".into(),
        }),
        daytime_policy(),
    );

    let feed = reader.read("u1").await.unwrap();
    assert_eq!(summary(&feed.songs), vec![("s1".to_string(), 4)]);
}
