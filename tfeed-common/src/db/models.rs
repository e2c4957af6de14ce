//! Database models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Kind of ledger entry
///
/// `Meta` marks a subscription-lifecycle notification rather than a
/// content recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Song,
    Album,
    Artist,
    Meta,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Song => "SONG",
            EntryType::Album => "ALBUM",
            EntryType::Artist => "ARTIST",
            EntryType::Meta => "META",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SONG" => Ok(EntryType::Song),
            "ALBUM" => Ok(EntryType::Album),
            "ARTIST" => Ok(EntryType::Artist),
            "META" => Ok(EntryType::Meta),
            other => Err(Error::InvalidInput(format!("Unknown entry type: {}", other))),
        }
    }
}

impl TryFrom<String> for EntryType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One row of a user's feed ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub user_id: String,
    /// Storage ordering key; identity for point deletes and in-place updates
    pub created_at: String,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content_id: String,
    pub reason: String,
    pub score: i64,
    /// Semantic event time (ISO-8601)
    pub timestamp: String,
    /// Structured provenance tag (`rating`, `listen`, `genre:<id>`, ...)
    pub source: Option<String>,
}

/// Ledger row before a sort key has been assigned
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedEntry {
    pub user_id: String,
    pub entry_type: EntryType,
    pub content_id: String,
    pub reason: String,
    pub score: i64,
    pub timestamp: String,
    pub source: Option<String>,
}

/// A user's subscription to an artist or genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: String,
    pub target_id: String,
    pub target_type: String,
}

/// Denormalized member of a genre in the catalog index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub genre_name: String,
    /// Sort key within the genre (`SONG#<id>`); also the paging cursor
    pub entity_key: String,
    pub entity_type: EntryType,
    pub entity_id: String,
    pub title: Option<String>,
    pub name: Option<String>,
}

impl CatalogItem {
    pub fn entity_key_for(entity_type: EntryType, entity_id: &str) -> String {
        format!("{}#{}", entity_type, entity_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist_ids: Vec<String>,
    pub genre_ids: Vec<String>,
    pub album_id: Option<String>,
    pub s3_key_cover: Option<String>,
    pub s3_key_audio: Option<String>,
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub title: String,
    pub release_date: Option<String>,
    pub artist_ids: Vec<String>,
    pub genre_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub biography: Option<String>,
    pub genre_ids: Vec<String>,
}
