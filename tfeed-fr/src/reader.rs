//! Feed aggregation and hydration
//!
//! A read collapses the user's ledger into one recommendation per
//! `(contentId, type)`, ranks each partition independently and resolves the
//! survivors against the content records. Reads never write; content that
//! has been deleted since it entered the ledger is filtered out here.

use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tfeed_common::db::{Album, Artist, EntryType, FeedEntry, Song};
use tfeed_common::scoring::{EVENING_BONUS, LISTENING_REASON};
use tfeed_common::signer::UrlSigner;
use tfeed_common::store::{ContentLookup, FeedStore, SqliteCatalog, SqliteFeedStore};
use tfeed_common::time::parse_iso;
use tfeed_common::{FeedPolicy, Result};
use tracing::{debug, warn};

/// One ranked `(contentId, partition)` before hydration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub content_id: String,
    pub score: i64,
}

/// Ranked partitions, each sorted by descending score and capped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedFeed {
    pub songs: Vec<Recommendation>,
    pub albums: Vec<Recommendation>,
    /// ARTIST and META groups, merged by content id
    pub artists: Vec<Recommendation>,
}

struct Group<'a> {
    content_id: &'a str,
    entry_type: EntryType,
    score: i64,
    evening_listen: bool,
}

/// Collapse a newest-first ledger into ranked partitions
///
/// Ties keep first-seen order, so a fixed ledger always ranks the same way.
pub fn rank(ledger: &[FeedEntry], policy: &FeedPolicy) -> RankedFeed {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<(&str, EntryType), usize> = HashMap::new();

    for entry in ledger {
        let slot = *index
            .entry((entry.content_id.as_str(), entry.entry_type))
            .or_insert_with(|| {
                groups.push(Group {
                    content_id: &entry.content_id,
                    entry_type: entry.entry_type,
                    score: 0,
                    evening_listen: false,
                });
                groups.len() - 1
            });

        let group = &mut groups[slot];
        group.score += entry.score;
        if entry.entry_type == EntryType::Song
            && entry.reason == LISTENING_REASON
            && parse_iso(&entry.timestamp).is_some_and(|ts| policy.is_evening(ts))
        {
            group.evening_listen = true;
        }
    }

    let mut feed = RankedFeed::default();
    let mut artist_slots: HashMap<&str, usize> = HashMap::new();

    for group in groups {
        let score = group.score + if group.evening_listen { EVENING_BONUS } else { 0 };
        let recommendation = Recommendation {
            content_id: group.content_id.to_string(),
            score,
        };

        match group.entry_type {
            EntryType::Song => feed.songs.push(recommendation),
            EntryType::Album => feed.albums.push(recommendation),
            EntryType::Artist | EntryType::Meta => match artist_slots.get(group.content_id) {
                Some(&slot) => feed.artists[slot].score += score,
                None => {
                    artist_slots.insert(group.content_id, feed.artists.len());
                    feed.artists.push(recommendation);
                }
            },
        }
    }

    for partition in [&mut feed.songs, &mut feed.albums, &mut feed.artists] {
        partition.sort_by(|a, b| b.score.cmp(&a.score));
        partition.truncate(policy.partition_cap);
    }

    feed
}

/// Song record plus short-lived media URLs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongView {
    #[serde(flatten)]
    pub song: Song,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

/// One hydrated recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum FeedItem {
    Song { score: i64, song: SongView },
    Album { score: i64, album: Album },
    Artist { score: i64, artist: Artist },
}

impl FeedItem {
    pub fn score(&self) -> i64 {
        match self {
            FeedItem::Song { score, .. }
            | FeedItem::Album { score, .. }
            | FeedItem::Artist { score, .. } => *score,
        }
    }

    pub fn content_id(&self) -> &str {
        match self {
            FeedItem::Song { song, .. } => &song.song.id,
            FeedItem::Album { album, .. } => &album.id,
            FeedItem::Artist { artist, .. } => &artist.id,
        }
    }
}

/// Response body of `GET /feed`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedResponse {
    pub songs: Vec<FeedItem>,
    pub albums: Vec<FeedItem>,
    pub artists: Vec<FeedItem>,
}

/// Read side of the feed
#[derive(Clone)]
pub struct FeedReader {
    feed: Arc<dyn FeedStore>,
    content: Arc<dyn ContentLookup>,
    media: Option<(Arc<dyn UrlSigner>, String)>,
    policy: FeedPolicy,
}

impl FeedReader {
    pub fn new(feed: Arc<dyn FeedStore>, content: Arc<dyn ContentLookup>, policy: FeedPolicy) -> Self {
        Self {
            feed,
            content,
            media: None,
            policy,
        }
    }

    /// Reader backed entirely by one SQLite database
    pub fn sqlite(pool: SqlitePool, policy: FeedPolicy) -> Self {
        Self::new(
            Arc::new(SqliteFeedStore::new(pool.clone())),
            Arc::new(SqliteCatalog::new(pool)),
            policy,
        )
    }

    /// Attach media URLs for songs stored in `bucket`
    pub fn with_signer(mut self, signer: Arc<dyn UrlSigner>, bucket: impl Into<String>) -> Self {
        self.media = Some((signer, bucket.into()));
        self
    }

    pub fn policy(&self) -> &FeedPolicy {
        &self.policy
    }

    /// Ranked, hydrated feed for one user
    pub async fn read(&self, user_id: &str) -> Result<FeedResponse> {
        let ledger = self.feed.ledger(user_id).await?;
        let ranked = rank(&ledger, &self.policy);

        let (songs, albums, artists) = tokio::join!(
            self.hydrate_songs(&ranked.songs),
            self.hydrate_albums(&ranked.albums),
            self.hydrate_artists(&ranked.artists),
        );

        debug!(
            user_id,
            entries = ledger.len(),
            songs = songs.len(),
            albums = albums.len(),
            artists = artists.len(),
            "Read feed"
        );
        Ok(FeedResponse {
            songs,
            albums,
            artists,
        })
    }

    async fn hydrate_songs(&self, ranked: &[Recommendation]) -> Vec<FeedItem> {
        let found = join_all(ranked.iter().map(|rec| self.content.song(&rec.content_id))).await;
        ranked
            .iter()
            .zip(found)
            .filter_map(|(rec, found)| {
                resolved(rec, "song", found).map(|song| FeedItem::Song {
                    score: rec.score,
                    song: self.present(song),
                })
            })
            .collect()
    }

    async fn hydrate_albums(&self, ranked: &[Recommendation]) -> Vec<FeedItem> {
        let found = join_all(ranked.iter().map(|rec| self.content.album(&rec.content_id))).await;
        ranked
            .iter()
            .zip(found)
            .filter_map(|(rec, found)| {
                resolved(rec, "album", found).map(|album| FeedItem::Album {
                    score: rec.score,
                    album,
                })
            })
            .collect()
    }

    async fn hydrate_artists(&self, ranked: &[Recommendation]) -> Vec<FeedItem> {
        let found = join_all(ranked.iter().map(|rec| self.content.artist(&rec.content_id))).await;
        ranked
            .iter()
            .zip(found)
            .filter_map(|(rec, found)| {
                resolved(rec, "artist", found).map(|artist| FeedItem::Artist {
                    score: rec.score,
                    artist,
                })
            })
            .collect()
    }

    fn present(&self, song: Song) -> SongView {
        let (audio_url, cover_url) = match &self.media {
            Some((signer, bucket)) => (
                song.s3_key_audio.as_deref().map(|key| signer.sign(bucket, key)),
                song.s3_key_cover.as_deref().map(|key| signer.sign(bucket, key)),
            ),
            None => (None, None),
        };
        SongView {
            song,
            audio_url,
            cover_url,
        }
    }
}

/// Keep a resolved entity; missing or unreadable content drops the recommendation
fn resolved<T>(rec: &Recommendation, kind: &str, found: Result<Option<T>>) -> Option<T> {
    match found {
        Ok(Some(entity)) => Some(entity),
        Ok(None) => {
            debug!(content_id = %rec.content_id, kind, "Dropping recommendation for missing content");
            None
        }
        Err(e) => {
            warn!(content_id = %rec.content_id, kind, "Content lookup failed, dropping recommendation: {}", e);
            None
        }
    }
}
