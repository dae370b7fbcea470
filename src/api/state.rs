//! Shared state passed to all API handlers

use std::sync::Arc;

use crate::actors::broadcaster::BroadcastHandle;
use crate::actors::heartbeat::HeartbeatHandle;
use crate::analytics::AnalyticsEngine;
use crate::registry::ConnectionRegistry;
use crate::source::SampleSource;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Registry of live WebSocket connections and their subscriptions
    pub registry: Arc<ConnectionRegistry>,

    /// Handle to the broadcast engine for start/stop and status queries
    pub broadcast: BroadcastHandle,

    /// Handle to the heartbeat supervisor
    pub heartbeat: HeartbeatHandle,

    /// Analytics engine for correlation and anomaly requests
    pub analytics: Arc<AnalyticsEngine>,

    /// Backing sensor data source
    pub source: Arc<dyn SampleSource>,
}

impl ApiState {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcast: BroadcastHandle,
        heartbeat: HeartbeatHandle,
        analytics: Arc<AnalyticsEngine>,
        source: Arc<dyn SampleSource>,
    ) -> Self {
        Self {
            registry,
            broadcast,
            heartbeat,
            analytics,
            source,
        }
    }
}
