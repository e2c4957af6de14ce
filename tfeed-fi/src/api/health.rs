//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tfeed_common::api::{ApiResult, HealthResponse};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IngestorHealth {
    #[serde(flatten)]
    pub health: HealthResponse,
    /// Messages waiting on the bus, leased or not
    pub pending_messages: i64,
    pub dead_letters: i64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<IngestorHealth>> {
    Ok(Json(IngestorHealth {
        health: HealthResponse::ok("tfeed-fi", env!("CARGO_PKG_VERSION"), state.started_at),
        pending_messages: state.bus.pending_count().await?,
        dead_letters: state.bus.dead_letter_count().await?,
    }))
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
