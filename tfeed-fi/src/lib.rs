//! tfeed-fi library - Feed Ingestor
//!
//! Consumes domain events from the bus and maintains each user's feed
//! ledger. The HTTP surface only accepts events for publication and reports
//! health; all ledger mutation happens in the background worker.

use axum::Router;
use chrono::{DateTime, Utc};
use tfeed_common::bus::EventBus;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod ingestor;
pub mod worker;

pub use ingestor::{ApplyReport, FeedIngestor, Outcome};
pub use worker::{BatchSummary, FeedWorker};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5790;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            started_at: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
