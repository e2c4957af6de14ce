//! Repository interfaces
//!
//! The feed engine keeps no in-process shared state. The ledger and every
//! collaborator index are reached through these narrow traits, so workers
//! can run concurrently and tests can substitute failing collaborators.

mod catalog;
mod feed;

pub use catalog::SqliteCatalog;
pub use feed::SqliteFeedStore;

use crate::db::models::{
    Album, Artist, CatalogItem, EntryType, FeedEntry, NewFeedEntry, Song, Subscription,
};
use crate::Result;
use async_trait::async_trait;

/// Per-user feed ledger
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Append an entry under a fresh, per-user unique sort key
    async fn insert(&self, entry: NewFeedEntry) -> Result<FeedEntry>;

    /// Full ledger for one user, newest first
    async fn ledger(&self, user_id: &str) -> Result<Vec<FeedEntry>>;

    /// Delete every entry for `(user, content)` regardless of type
    async fn purge_content(&self, user_id: &str, content_id: &str) -> Result<u64>;

    /// Delete every entry for `(user, content, type)`
    async fn purge_content_type(
        &self,
        user_id: &str,
        content_id: &str,
        entry_type: EntryType,
    ) -> Result<u64>;

    /// Delete entries tagged with `source`, or whose reason mentions `needle`
    async fn purge_by_provenance(&self, user_id: &str, source: &str, needle: &str) -> Result<u64>;

    /// Count `delta` plays on the single listening entry for `(user, song)`
    ///
    /// Creates the entry on the first play; afterwards adds to its score and
    /// refreshes its event timestamp. Concurrent calls for the same pair
    /// never produce a second entry.
    async fn record_listen(
        &self,
        user_id: &str,
        song_id: &str,
        delta: i64,
        timestamp: &str,
    ) -> Result<ListenWrite>;
}

/// What [`FeedStore::record_listen`] did to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum ListenWrite {
    Inserted(FeedEntry),
    Updated(FeedEntry),
}

impl ListenWrite {
    pub fn entry(&self) -> &FeedEntry {
        match self {
            ListenWrite::Inserted(entry) | ListenWrite::Updated(entry) => entry,
        }
    }
}

/// Target → subscribed users
#[async_trait]
pub trait SubscriptionIndex: Send + Sync {
    async fn subscribers(&self, target_id: &str) -> Result<Vec<Subscription>>;
}

/// One page of a genre's catalog members
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    /// Continuation token; `None` when the genre is exhausted
    pub next: Option<String>,
}

/// Genre name → member entities
#[async_trait]
pub trait CatalogIndex: Send + Sync {
    async fn entities_by_genre(
        &self,
        genre_name: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<CatalogPage>;
}

/// Genre id → name
#[async_trait]
pub trait GenreDirectory: Send + Sync {
    async fn genre_name(&self, genre_id: &str) -> Result<Option<String>>;
}

/// Canonical content records by id
#[async_trait]
pub trait ContentLookup: Send + Sync {
    async fn song(&self, id: &str) -> Result<Option<Song>>;
    async fn album(&self, id: &str) -> Result<Option<Album>>;
    async fn artist(&self, id: &str) -> Result<Option<Artist>>;
}

/// Catalog page size used while walking a genre
pub const CATALOG_PAGE_SIZE: usize = 25;

/// Collect up to `cap` members of a genre, following continuation tokens
pub async fn collect_genre_members(
    catalog: &dyn CatalogIndex,
    genre_name: &str,
    cap: usize,
) -> Result<Vec<CatalogItem>> {
    let mut members = Vec::new();
    let mut cursor: Option<String> = None;

    while members.len() < cap {
        let limit = CATALOG_PAGE_SIZE.min(cap - members.len());
        let page = catalog
            .entities_by_genre(genre_name, cursor.as_deref(), limit)
            .await?;
        let exhausted = page.items.is_empty();
        members.extend(page.items);

        match page.next {
            Some(next) if !exhausted => cursor = Some(next),
            _ => break,
        }
    }

    members.truncate(cap);
    Ok(members)
}
