//! Helper functions for integration tests

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use sensorhub::SensorRecord;
use sensorhub::actors::broadcaster::BroadcastHandle;
use sensorhub::actors::heartbeat::HeartbeatHandle;
use sensorhub::actors::messages::ServerMessage;
use sensorhub::analytics::AnalyticsEngine;
use sensorhub::config::AnalyticsConfig;
use sensorhub::registry::{ClientId, ConnectionRegistry, OUTBOUND_BUFFER};
use sensorhub::router::RouterContext;
use sensorhub::source::MemorySource;

/// A fully wired hub without the HTTP layer: source, registry, both
/// actors, analytics, and a router context over all of them.
pub struct TestHub {
    pub source: Arc<MemorySource>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcast: BroadcastHandle,
    pub heartbeat: HeartbeatHandle,
    pub ctx: RouterContext,
}

/// Spin up a hub with a long broadcast interval so ticks only happen
/// when a test asks for one, and a short heartbeat timeout so staleness
/// tests stay fast.
pub async fn spawn_test_hub(heartbeat_timeout: Duration) -> TestHub {
    let source = Arc::new(MemorySource::new());
    let registry = Arc::new(ConnectionRegistry::new());

    let broadcast = BroadcastHandle::spawn(
        source.clone(),
        registry.clone(),
        Duration::from_secs(3600),
        10,
    );
    let heartbeat = HeartbeatHandle::spawn(
        registry.clone(),
        broadcast.clone(),
        Duration::from_secs(3600),
        heartbeat_timeout,
    );
    let analytics = Arc::new(AnalyticsEngine::new(
        source.clone(),
        AnalyticsConfig::default(),
    ));

    let ctx = RouterContext {
        registry: registry.clone(),
        broadcast: broadcast.clone(),
        analytics,
    };

    TestHub {
        source,
        registry,
        broadcast,
        heartbeat,
        ctx,
    }
}

impl TestHub {
    /// Register a client with a normally sized outbound queue.
    pub async fn connect(&self) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let id = self.registry.register(tx).await;
        (id, rx)
    }

    /// Register a client whose queue fills after a single message.
    pub async fn connect_slow(&self) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(1);
        let id = self.registry.register(tx).await;
        (id, rx)
    }
}

/// Build one record with the given entry id and stream values, one
/// second apart from its neighbours.
pub fn record(entry_id: u64, values: &[(&str, f64)]) -> SensorRecord {
    let base = Utc.with_ymd_and_hms(2025, 3, 18, 6, 0, 0).unwrap();

    SensorRecord {
        created_at: base + chrono::Duration::seconds(entry_id as i64),
        entry_id,
        was_interpolated: None,
        values: values
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Seed the source with `n` records over the given streams, values
/// increasing linearly per stream.
pub async fn seed_linear(source: &MemorySource, streams: &[&str], n: u64) {
    for i in 1..=n {
        let values: Vec<(&str, f64)> = streams
            .iter()
            .enumerate()
            .map(|(s, name)| (*name, 10.0 * (s + 1) as f64 + i as f64))
            .collect();
        source.push(record(i, &values)).await;
    }
}
