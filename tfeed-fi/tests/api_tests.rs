//! Integration tests for tfeed-fi HTTP endpoints

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tfeed_common::bus::EventBus;
use tfeed_common::db::init_database;
use tfeed_fi::{build_router, AppState};
use tower::util::ServiceExt; // for `oneshot` method

async fn setup() -> (TempDir, EventBus) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("tfeed.db")).await.unwrap();
    (dir, EventBus::new(pool))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, bus) = setup().await;
    let app = build_router(AppState::new(bus));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "tfeed-fi");
    assert_eq!(body["pending_messages"], 0);
    assert_eq!(body["dead_letters"], 0);
}

#[tokio::test]
async fn test_post_event_enqueues_on_bus() {
    let (_dir, bus) = setup().await;
    let app = build_router(AppState::new(bus.clone()));

    let response = app
        .oneshot(post_json(
            "/events",
            json!({"eventType": "song_listened", "userId": "u1", "songId": "s1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["eventType"], "song_listened");
    assert_eq!(body["handled"], true);
    assert!(body["messageId"].is_string());
    assert_eq!(bus.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_post_unknown_event_is_accepted_unhandled() {
    let (_dir, bus) = setup().await;
    let app = build_router(AppState::new(bus.clone()));

    let response = app
        .oneshot(post_json("/events", json!({"eventType": "playlist_created"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["handled"], false);
    assert_eq!(bus.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_post_malformed_event_is_rejected() {
    let (_dir, bus) = setup().await;
    let app = build_router(AppState::new(bus.clone()));

    let response = app
        .oneshot(post_json(
            "/events",
            json!({"eventType": "content_rated", "userId": "u1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["message"].as_str().unwrap().contains("content_rated"));
    assert_eq!(bus.pending_count().await.unwrap(), 0);
}
