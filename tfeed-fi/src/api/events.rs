//! Event publication endpoint
//!
//! Producers without direct bus access post envelopes here. The envelope is
//! decoded up front so a malformed payload is rejected to its sender instead
//! of being skipped silently by the worker.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use serde_json::Value;
use tfeed_common::api::{ApiError, ApiResult};
use tfeed_common::events::{decode, Envelope};
use tracing::info;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub message_id: String,
    pub event_type: String,
    /// False when no consumer in this engine handles the event type
    pub handled: bool,
}

/// POST /events
pub async fn publish_event(
    State(state): State<AppState>,
    Json(envelope): Json<Value>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    let body = envelope.to_string();
    let (event_type, handled) = match decode(&body).map_err(ApiError::from)? {
        Envelope::Known(event) => (event.event_type().to_string(), true),
        Envelope::Unknown(event_type) => (event_type, false),
    };

    let message_id = state.bus.publish(&body).await?;
    info!(message_id = %message_id, event_type = %event_type, "Accepted event");

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            message_id,
            event_type,
            handled,
        }),
    ))
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", post(publish_event))
}
