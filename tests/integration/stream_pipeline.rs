//! End-to-end tests for the subscribe/broadcast/heartbeat pipeline
//!
//! These wire the router, registry, broadcast engine, and heartbeat
//! supervisor together the way the socket layer does, minus the socket.

use std::time::Duration;

use pretty_assertions::assert_eq;

use sensorhub::actors::messages::ServerMessage;
use sensorhub::router::handle_message;

use crate::helpers::*;

#[tokio::test]
async fn subscriber_receives_only_its_streams() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_linear(&hub.source, &["temperature", "humidity", "pressure"], 5).await;

    let (id, mut rx) = hub.connect().await;
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

    hub.broadcast.tick_now().await.unwrap();

    let Some(ServerMessage::DataUpdate {
        data,
        update_count,
        ..
    }) = rx.recv().await
    else {
        panic!("expected a data update");
    };

    assert_eq!(update_count, 1);
    assert_eq!(data.keys().collect::<Vec<_>>(), vec!["temperature"]);

    let samples = &data["temperature"];
    assert_eq!(samples.len(), 5);
    // linear seed: stream 1 baseline 10 plus the record index
    assert_eq!(samples.last().unwrap().value, 15.0);
    assert_eq!(samples.last().unwrap().entry_id, 5);
}

#[tokio::test]
async fn clients_with_different_subscriptions_get_different_slices() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_linear(&hub.source, &["temperature", "humidity"], 3).await;

    let (first, mut first_rx) = hub.connect().await;
    let (second, mut second_rx) = hub.connect().await;

    handle_message(
        &hub.ctx,
        first,
        r#"{"type": "subscribe", "streams": ["temperature"]}"#,
    )
    .await;
    handle_message(
        &hub.ctx,
        second,
        r#"{"type": "subscribe", "streams": ["humidity"]}"#,
    )
    .await;

    hub.broadcast.tick_now().await.unwrap();

    let Some(ServerMessage::DataUpdate { data, .. }) = first_rx.recv().await else {
        panic!("first client got no update");
    };
    assert_eq!(data.keys().collect::<Vec<_>>(), vec!["temperature"]);

    let Some(ServerMessage::DataUpdate { data, .. }) = second_rx.recv().await else {
        panic!("second client got no update");
    };
    assert_eq!(data.keys().collect::<Vec<_>>(), vec!["humidity"]);
}

#[tokio::test]
async fn update_count_increments_across_ticks() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_linear(&hub.source, &["temperature"], 2).await;

    let (id, mut rx) = hub.connect().await;
    handle_message(
        &hub.ctx,
        id,
        r#"{"type": "subscribe", "streams": ["temperature"]}"#,
    )
    .await;

    for expected in 1..=3u64 {
        hub.broadcast.tick_now().await.unwrap();
        let Some(ServerMessage::DataUpdate { update_count, .. }) = rx.recv().await else {
            panic!("missing update {expected}");
        };
        assert_eq!(update_count, expected);
    }
}

#[tokio::test]
async fn engine_goes_idle_when_last_subscription_is_dropped() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;

    let (id, _rx) = hub.connect().await;
    handle_message(
        &hub.ctx,
        id,
        r#"{"type": "subscribe", "streams": ["temperature"]}"#,
    )
    .await;
    assert!(hub.broadcast.status().await.unwrap().active);

    handle_message(
        &hub.ctx,
        id,
        r#"{"type": "unsubscribe", "streams": ["temperature"]}"#,
    )
    .await;
    assert!(!hub.broadcast.status().await.unwrap().active);
}

#[tokio::test]
async fn heartbeat_probe_reaches_the_client_queue() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    let (_id, mut rx) = hub.connect().await;

    let evicted = hub.heartbeat.sweep_now().await.unwrap();
    assert_eq!(evicted, 0);

    assert_eq!(rx.recv().await, Some(ServerMessage::Probe));
}

#[tokio::test]
async fn responsive_client_survives_repeated_sweeps() {
    let hub = spawn_test_hub(Duration::from_millis(50)).await;
    let (id, mut rx) = hub.connect().await;

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(30)).await;
        // a pong in the socket layer becomes a touch
        assert!(hub.registry.touch(id).await);
        let evicted = hub.heartbeat.sweep_now().await.unwrap();
        assert_eq!(evicted, 0);
        assert_eq!(rx.recv().await, Some(ServerMessage::Probe));
    }

    assert_eq!(hub.registry.len().await, 1);
}
