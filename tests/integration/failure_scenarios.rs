//! Failure handling across the pipeline
//!
//! Bad input, dead connections, and slow consumers must never take down
//! the hub or starve the healthy clients.

use std::time::Duration;

use pretty_assertions::assert_eq;

use sensorhub::actors::messages::ServerMessage;
use sensorhub::router::handle_message;

use crate::helpers::*;

#[tokio::test]
async fn malformed_message_leaves_the_connection_usable() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    let (id, _rx) = hub.connect().await;

    let reply = handle_message(&hub.ctx, id, "{{{").await;
    assert_eq!(
        reply,
        Some(ServerMessage::Error {
            message: "invalid message format".to_string(),
        })
    );

    // same connection can still subscribe afterwards
    let reply = handle_message(
        &hub.ctx,
        id,
        r#"{"type": "subscribe", "streams": ["temperature"]}"#,
    )
    .await;
    assert_eq!(
        reply,
        Some(ServerMessage::SubscriptionConfirmed {
            streams: vec!["temperature".to_string()],
        })
    );
}

#[tokio::test]
async fn dead_connection_is_evicted_on_tick_and_others_still_served() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_linear(&hub.source, &["temperature"], 3).await;

    let (dead, dead_rx) = hub.connect().await;
    let (alive, mut alive_rx) = hub.connect().await;

    for id in [dead, alive] {
        handle_message(
            &hub.ctx,
            id,
            r#"{"type": "subscribe", "streams": ["temperature"]}"#,
        )
        .await;
    }

    // simulate a torn-down socket: the reader half is gone
    drop(dead_rx);

    hub.broadcast.tick_now().await.unwrap();

    assert!(matches!(
        alive_rx.recv().await,
        Some(ServerMessage::DataUpdate { .. })
    ));
    assert_eq!(hub.registry.len().await, 1);
    assert!(hub.registry.subscriptions_of(dead).await.is_none());
}

#[tokio::test]
async fn slow_consumer_drops_updates_but_keeps_its_seat() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_linear(&hub.source, &["temperature"], 3).await;

    let (slow, mut slow_rx) = hub.connect_slow().await;
    let (fast, mut fast_rx) = hub.connect().await;

    for id in [slow, fast] {
        handle_message(
            &hub.ctx,
            id,
            r#"{"type": "subscribe", "streams": ["temperature"]}"#,
        )
        .await;
    }

    // first tick fills the slow queue, second overflows it
    hub.broadcast.tick_now().await.unwrap();
    hub.broadcast.tick_now().await.unwrap();

    // the fast client saw both updates
    for expected in 1..=2u64 {
        let Some(ServerMessage::DataUpdate { update_count, .. }) = fast_rx.recv().await else {
            panic!("fast client missing update {expected}");
        };
        assert_eq!(update_count, expected);
    }

    // the slow client kept its slot and the one update that fit
    assert_eq!(hub.registry.len().await, 2);
    let Some(ServerMessage::DataUpdate { update_count, .. }) = slow_rx.recv().await else {
        panic!("slow client should still hold one update");
    };
    assert_eq!(update_count, 1);
}

#[tokio::test]
async fn stale_client_eviction_shuts_the_engine_down() {
    let hub = spawn_test_hub(Duration::from_millis(10)).await;

    let (id, _rx) = hub.connect().await;
    handle_message(
        &hub.ctx,
        id,
        r#"{"type": "subscribe", "streams": ["temperature"]}"#,
    )
    .await;
    assert!(hub.broadcast.status().await.unwrap().active);

    tokio::time::sleep(Duration::from_millis(30)).await;

    let evicted = hub.heartbeat.sweep_now().await.unwrap();
    assert_eq!(evicted, 1);
    assert!(hub.registry.is_empty().await);
    assert!(!hub.broadcast.status().await.unwrap().active);
}

#[tokio::test]
async fn eviction_spares_fresh_clients() {
    let hub = spawn_test_hub(Duration::from_millis(50)).await;

    let (stale, _stale_rx) = hub.connect().await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    let (fresh, mut fresh_rx) = hub.connect().await;

    let evicted = hub.heartbeat.sweep_now().await.unwrap();
    assert_eq!(evicted, 1);

    assert!(hub.registry.subscriptions_of(stale).await.is_none());
    assert!(hub.registry.subscriptions_of(fresh).await.is_some());
    assert_eq!(fresh_rx.recv().await, Some(ServerMessage::Probe));
}
