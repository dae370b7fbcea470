//! Analytics requests driven through the message router

use std::time::Duration;

use pretty_assertions::assert_eq;

use sensorhub::actors::messages::ServerMessage;
use sensorhub::router::handle_message;

use crate::helpers::*;

/// Three streams over five aligned records: `a` rises, `b` is a linear
/// function of `a`, `c` falls. Pairwise correlations are exactly +1 and -1.
async fn seed_correlated(hub: &TestHub) {
    for i in 1..=5u64 {
        let x = i as f64;
        hub.source
            .push(record(i, &[("a", x), ("b", 2.0 * x + 3.0), ("c", 10.0 - x)]))
            .await;
    }
}

const WINDOW: &str = r#""start": "2025-03-18T00:00:00Z", "end": "2025-03-19T00:00:00Z""#;

#[tokio::test]
async fn correlation_report_flags_the_anticorrelated_stream() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_correlated(&hub).await;
    let (id, _rx) = hub.connect().await;

    let request = format!(
        r#"{{"type": "request_correlation", "streams": ["a", "b", "c"], {WINDOW}, "threshold": -0.5}}"#
    );
    let reply = handle_message(&hub.ctx, id, &request).await;

    let Some(ServerMessage::CorrelationResult { data }) = reply else {
        panic!("expected correlation result, got {reply:?}");
    };

    assert_eq!(data.sample_size, 5);
    // a and b each average (1 + -1) / 2 = 0, c averages -1
    assert!(data.streams["a"].avg_corr.abs() < 1e-9);
    assert!(data.streams["b"].avg_corr.abs() < 1e-9);
    assert!((data.streams["c"].avg_corr + 1.0).abs() < 1e-9);
    assert!(!data.streams["a"].is_outlier);
    assert!(!data.streams["b"].is_outlier);
    assert!(data.streams["c"].is_outlier);
}

#[tokio::test]
async fn default_threshold_flags_nothing() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_correlated(&hub).await;
    let (id, _rx) = hub.connect().await;

    let request =
        format!(r#"{{"type": "request_correlation", "streams": ["a", "b", "c"], {WINDOW}}}"#);
    let reply = handle_message(&hub.ctx, id, &request).await;

    let Some(ServerMessage::CorrelationResult { data }) = reply else {
        panic!("expected correlation result, got {reply:?}");
    };
    assert!(data.streams.values().all(|s| !s.is_outlier));
}

#[tokio::test]
async fn too_few_streams_is_a_client_error_not_a_crash() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_correlated(&hub).await;
    let (id, _rx) = hub.connect().await;

    let request = format!(r#"{{"type": "request_correlation", "streams": ["a"], {WINDOW}}}"#);
    let reply = handle_message(&hub.ctx, id, &request).await;

    let Some(ServerMessage::Error { message }) = reply else {
        panic!("expected error reply, got {reply:?}");
    };
    assert!(message.contains("at least 3 streams"));

    // the hub keeps serving
    let request =
        format!(r#"{{"type": "request_correlation", "streams": ["a", "b", "c"], {WINDOW}}}"#);
    let reply = handle_message(&hub.ctx, id, &request).await;
    assert!(matches!(
        reply,
        Some(ServerMessage::CorrelationResult { .. })
    ));
}

#[tokio::test]
async fn anomaly_detection_flags_a_spike() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    for i in 1..=19u64 {
        let value = if i % 2 == 1 { 10.0 } else { 12.0 };
        hub.source.push(record(i, &[("temperature", value)])).await;
    }
    hub.source.push(record(20, &[("temperature", 200.0)])).await;

    let (id, _rx) = hub.connect().await;
    let request = format!(
        r#"{{"type": "request_anomaly_detection", "streams": ["temperature"], {WINDOW}}}"#
    );
    let reply = handle_message(&hub.ctx, id, &request).await;

    let Some(ServerMessage::AnomalyDetectionResult { data }) = reply else {
        panic!("expected anomaly result, got {reply:?}");
    };

    assert_eq!(data.total_points, 20);
    assert_eq!(data.anomaly_count, 1);
    assert_eq!(data.anomaly_percentage, 5.0);
    assert_eq!(data.algorithm_used, "z_score");

    let flagged: Vec<_> = data.data.iter().filter(|p| p.is_anomaly).collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].value, 200.0);
    assert_eq!(flagged[0].stream, "temperature");
}

#[tokio::test]
async fn unsupported_algorithm_is_rejected() {
    let hub = spawn_test_hub(Duration::from_secs(30)).await;
    seed_correlated(&hub).await;
    let (id, _rx) = hub.connect().await;

    let request = format!(
        r#"{{"type": "request_anomaly_detection", "streams": ["a"], {WINDOW}, "algorithm": "iqr"}}"#
    );
    let reply = handle_message(&hub.ctx, id, &request).await;

    let Some(ServerMessage::Error { message }) = reply else {
        panic!("expected error reply, got {reply:?}");
    };
    assert!(message.contains("unknown anomaly detection algorithm"));
}
