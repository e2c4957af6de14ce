//! tfeed-fr library - Feed Reader
//!
//! Serves each user's ranked feed, aggregated on demand from the ledger the
//! ingestor maintains.

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod reader;

pub use reader::{rank, FeedItem, FeedReader, FeedResponse, RankedFeed, Recommendation, SongView};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5791;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub reader: Arc<FeedReader>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(reader: FeedReader) -> Self {
        Self {
            reader: Arc::new(reader),
            started_at: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::feed_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
