//! Batch worker behaviour over the SQLite event bus

mod helpers;

use helpers::TestEnv;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tfeed_common::bus::EventBus;
use tfeed_common::FeedPolicy;
use tfeed_fi::{BatchSummary, FeedWorker};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_failing_message_does_not_abort_batch() {
    let env = TestEnv::new().await;
    env.subscribe("u2", "a1", "artist").await;
    let bus = EventBus::new(env.pool.clone());

    bus.publish(&json!({"eventType": "content_rated", "userId": "u1", "contentId": "c1", "ratingValue": "love"}).to_string())
        .await
        .unwrap();
    bus.publish("{\"eventType\": \"song_listened\"}").await.unwrap();
    bus.publish(&json!({"eventType": "playlist_created", "userId": "u1"}).to_string())
        .await
        .unwrap();
    bus.publish(&json!({"eventType": "content_published", "contentId": "s1", "artistIds": ["a1"]}).to_string())
        .await
        .unwrap();

    let worker = FeedWorker::new(bus.clone(), Arc::new(env.ingestor_failing_on("a1")));
    let summary = worker.process_batch().await.unwrap();

    assert_eq!(
        summary,
        BatchSummary {
            received: 4,
            applied: 1,
            ignored: 1,
            skipped: 1,
            retried: 1,
        }
    );

    // Only the retried message stays on the bus, leased until it expires
    assert_eq!(bus.pending_count().await.unwrap(), 1);
    assert_eq!(env.ledger("u1").await.len(), 1);
    assert!(env.ledger("u2").await.is_empty());
}

#[tokio::test]
async fn test_batch_size_limits_lease() {
    let env = TestEnv::new().await;
    let bus = EventBus::new(env.pool.clone());
    for i in 0..7 {
        bus.publish(&json!({"eventType": "song_listened", "userId": "u1", "songId": format!("s{}", i)}).to_string())
            .await
            .unwrap();
    }

    let worker = FeedWorker::new(bus.clone(), Arc::new(env.ingestor()));
    let first = worker.process_batch().await.unwrap();
    let second = worker.process_batch().await.unwrap();
    let third = worker.process_batch().await.unwrap();

    assert_eq!(first.received, FeedPolicy::default().batch_size);
    assert_eq!(first.received + second.received, 7);
    assert_eq!(third.received, 0);
    assert_eq!(bus.pending_count().await.unwrap(), 0);
    assert_eq!(env.ledger("u1").await.len(), 7);
}

#[tokio::test]
async fn test_repeated_listens_in_one_batch_accumulate() {
    let env = TestEnv::new().await;
    let bus = EventBus::new(env.pool.clone());
    for _ in 0..3 {
        bus.publish(&json!({"eventType": "song_listened", "userId": "u1", "songId": "s1"}).to_string())
            .await
            .unwrap();
    }

    let worker = FeedWorker::new(bus.clone(), Arc::new(env.ingestor()));
    let summary = worker.process_batch().await.unwrap();
    assert_eq!(summary.received, 3);
    assert_eq!(summary.applied, 3);

    let ledger = env.ledger("u1").await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].content_id, "s1");
    assert_eq!(ledger[0].reason, "Listening activity");
    assert_eq!(ledger[0].score, 3);
}

#[tokio::test]
async fn test_run_applies_published_events_until_cancelled() {
    let env = TestEnv::new().await;
    let bus = EventBus::new(env.pool.clone());
    let policy = FeedPolicy {
        poll_interval_ms: 20,
        ..FeedPolicy::default()
    };

    let worker = FeedWorker::new(bus.clone(), Arc::new(env.ingestor_with(policy)));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(cancel.clone()));

    bus.publish(&json!({"eventType": "song_listened", "userId": "u1", "songId": "s1"}).to_string())
        .await
        .unwrap();

    let mut applied = false;
    for _ in 0..100 {
        if !env.ledger("u1").await.is_empty() {
            applied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(applied, "Worker should apply the published event");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Worker should stop after cancellation")
        .unwrap();
}
