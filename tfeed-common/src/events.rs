//! Domain events consumed by the feed ingestor
//!
//! Events arrive as JSON envelopes discriminated by `eventType`. The set of
//! events is closed: anything else decodes to [`Envelope::Unknown`] and is
//! ignored by the ingestor rather than treated as an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type tags accepted on the bus, including legacy producer aliases
const KNOWN_EVENT_TYPES: &[&str] = &[
    "content_published",
    "song_uploaded",
    "content_rated",
    "user_rated",
    "rating_retracted",
    "rating_deleted",
    "user_subscribed",
    "user_unsubscribed",
    "song_listened",
];

/// Feed domain events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum FeedEvent {
    /// New song published; fans out to subscribers of its artists and genres
    #[serde(alias = "song_uploaded", rename_all = "camelCase")]
    ContentPublished {
        #[serde(alias = "songId")]
        content_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        artist_ids: Vec<String>,
        #[serde(default, alias = "genres")]
        genre_ids: Vec<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// User rated content; replaces any previous feed contribution for it
    #[serde(alias = "user_rated", rename_all = "camelCase")]
    ContentRated {
        user_id: String,
        content_id: String,
        #[serde(default, alias = "rating")]
        rating_value: Value,
    },

    /// User removed a rating
    #[serde(alias = "rating_deleted", rename_all = "camelCase")]
    RatingRetracted { user_id: String, content_id: String },

    /// User subscribed to an artist or genre
    #[serde(rename_all = "camelCase")]
    UserSubscribed {
        user_id: String,
        target_id: String,
        target_type: String,
    },

    /// User cancelled a subscription
    #[serde(rename_all = "camelCase")]
    UserUnsubscribed {
        user_id: String,
        target_id: String,
        target_type: String,
    },

    /// User played a song
    #[serde(rename_all = "camelCase")]
    SongListened { user_id: String, song_id: String },
}

/// Result of decoding one bus message body
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Known(FeedEvent),
    /// Well-formed envelope with an `eventType` this engine does not handle
    Unknown(String),
}

impl FeedEvent {
    /// Canonical `eventType` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::ContentPublished { .. } => "content_published",
            FeedEvent::ContentRated { .. } => "content_rated",
            FeedEvent::RatingRetracted { .. } => "rating_retracted",
            FeedEvent::UserSubscribed { .. } => "user_subscribed",
            FeedEvent::UserUnsubscribed { .. } => "user_unsubscribed",
            FeedEvent::SongListened { .. } => "song_listened",
        }
    }

    /// Owning user, for events scoped to one ledger
    pub fn user_id(&self) -> Option<&str> {
        match self {
            FeedEvent::ContentPublished { .. } => None,
            FeedEvent::ContentRated { user_id, .. }
            | FeedEvent::RatingRetracted { user_id, .. }
            | FeedEvent::UserSubscribed { user_id, .. }
            | FeedEvent::UserUnsubscribed { user_id, .. }
            | FeedEvent::SongListened { user_id, .. } => Some(user_id),
        }
    }

    /// Reject events whose required identifiers are present but empty
    pub fn validate(&self) -> Result<()> {
        let required: Vec<(&str, &str)> = match self {
            FeedEvent::ContentPublished { content_id, .. } => vec![("contentId", content_id.as_str())],
            FeedEvent::ContentRated {
                user_id,
                content_id,
                ..
            }
            | FeedEvent::RatingRetracted {
                user_id,
                content_id,
            } => vec![("userId", user_id.as_str()), ("contentId", content_id.as_str())],
            FeedEvent::UserSubscribed {
                user_id,
                target_id,
                target_type,
            }
            | FeedEvent::UserUnsubscribed {
                user_id,
                target_id,
                target_type,
            } => vec![
                ("userId", user_id.as_str()),
                ("targetId", target_id.as_str()),
                ("targetType", target_type.as_str()),
            ],
            FeedEvent::SongListened { user_id, song_id } => {
                vec![("userId", user_id.as_str()), ("songId", song_id.as_str())]
            }
        };

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::MalformedEvent(format!(
                    "{}: empty required field '{}'",
                    self.event_type(),
                    field
                )));
            }
        }
        Ok(())
    }
}

/// True when a subscription target type names a genre
pub fn is_genre_target(target_type: &str) -> bool {
    target_type.trim().eq_ignore_ascii_case("genre")
}

/// Decode a bus message body
///
/// Accepts a bare envelope or one wrapped in a pub/sub notification
/// (`{"Type": "Notification", "Message": "<envelope json>"}`).
pub fn decode(body: &str) -> Result<Envelope> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::MalformedEvent(format!("invalid JSON: {}", e)))?;
    decode_value(value)
}

fn decode_value(value: Value) -> Result<Envelope> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::MalformedEvent("envelope is not a JSON object".to_string()))?;

    let event_type = match object.get("eventType") {
        Some(Value::String(tag)) => tag.clone(),
        Some(_) => {
            return Err(Error::MalformedEvent("eventType is not a string".to_string()));
        }
        None => {
            if let Some(Value::String(inner)) = object.get("Message") {
                let inner: Value = serde_json::from_str(inner).map_err(|e| {
                    Error::MalformedEvent(format!("invalid wrapped message: {}", e))
                })?;
                return decode_value(inner);
            }
            return Err(Error::MalformedEvent("missing eventType".to_string()));
        }
    };

    if !KNOWN_EVENT_TYPES.contains(&event_type.as_str()) {
        return Ok(Envelope::Unknown(event_type));
    }

    let event: FeedEvent = serde_json::from_value(value)
        .map_err(|e| Error::MalformedEvent(format!("{}: {}", event_type, e)))?;
    event.validate()?;
    Ok(Envelope::Known(event))
}
