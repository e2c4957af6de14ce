//! Feed endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tfeed_common::api::{ApiError, ApiResult};

use crate::reader::FeedResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub user_id: Option<String>,
}

/// GET /feed?userId=<id>
pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<FeedResponse>> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing userId.".to_string()))?;

    let feed = state.reader.read(&user_id).await?;
    Ok(Json(feed))
}

pub fn feed_routes() -> Router<AppState> {
    Router::new().route("/feed", get(get_feed))
}
