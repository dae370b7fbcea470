//! Message types for actor communication and the client wire protocol
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Wire messages**: Closed tagged enums decoded at the boundary and
//!    exhaustively matched, instead of string-tag dispatch
//! 3. **Immutability**: All messages are cloneable for fan-out

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::StreamSample;
use crate::analytics::{AnomalyReport, CorrelationReport};
use crate::registry::ClientId;

/// Inbound client message envelope.
///
/// The `type` field selects the variant; anything that does not decode into
/// one of these is answered with a typed error reply, never a dropped
/// connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        streams: Vec<String>,
    },
    Unsubscribe {
        streams: Vec<String>,
    },
    RequestCorrelation {
        streams: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[serde(default)]
        threshold: Option<f64>,
    },
    RequestAnomalyDetection {
        streams: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[serde(default)]
        threshold: Option<f64>,
        #[serde(default)]
        algorithm: Option<String>,
    },
    /// Manual broadcast control, independent of subscription count
    StartStreaming,
    StopStreaming,
}

/// Outbound message to a client.
///
/// `Probe` never reaches the wire as JSON; the socket writer turns it into
/// a WebSocket ping frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        client_id: ClientId,
    },
    SubscriptionConfirmed {
        streams: Vec<String>,
    },
    UnsubscriptionConfirmed {
        streams: Vec<String>,
    },
    DataUpdate {
        data: BTreeMap<String, Vec<StreamSample>>,
        timestamp: DateTime<Utc>,
        update_count: u64,
    },
    CorrelationResult {
        data: CorrelationReport,
    },
    AnomalyDetectionResult {
        data: AnomalyReport,
    },
    Error {
        message: String,
    },
    /// Liveness probe, mapped to a ping frame by the connection writer
    Probe,
}

/// Commands that can be sent to the BroadcastActor
#[derive(Debug)]
pub enum BroadcastCommand {
    /// Arm the broadcast timer. No-op while already active.
    Start,

    /// Disarm the broadcast timer. No-op while already idle.
    Stop,

    /// Run one tick immediately, bypassing the timer and the idle state.
    ///
    /// Used for testing and manual refresh operations.
    TickNow {
        respond_to: oneshot::Sender<()>,
    },

    /// Report the current engine state
    Status {
        respond_to: oneshot::Sender<BroadcastStatus>,
    },

    /// Gracefully shut down the broadcaster
    Shutdown,
}

/// Broadcast engine state, used by health reporting and tests
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BroadcastStatus {
    pub active: bool,
    pub update_count: u64,
}

/// Commands that can be sent to the HeartbeatActor
#[derive(Debug)]
pub enum HeartbeatCommand {
    /// Run one liveness sweep immediately; replies with the number of
    /// evicted clients.
    SweepNow { respond_to: oneshot::Sender<usize> },

    /// Gracefully shut down the supervisor
    Shutdown,
}
