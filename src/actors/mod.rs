//! Actor-based stream hub core
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!    WebSocket tasks ──────► ConnectionRegistry ◄────── HeartbeatActor
//!    (one per client)            (shared, locked)        (liveness sweep)
//!          │                          ▲
//!          │ subscribe/unsubscribe    │ snapshot()
//!          ▼                          │
//!     Message Router ──start/stop──► BroadcastActor ──► per-client mpsc
//!          │                              │
//!          ▼                              ▼
//!    AnalyticsEngine ◄──── SampleSource (read-only window access)
//! ```
//!
//! ## Actor Types
//!
//! - **BroadcastActor**: periodic push of fresh data slices to subscribers,
//!   with a lazy idle/active timer
//! - **HeartbeatActor**: probes client liveness and evicts the silent
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Per-connection channels**: outbound sends are fire-and-forget into a
//!    bounded mpsc per client, so one slow consumer never stalls the loop
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod broadcaster;
pub mod heartbeat;
pub mod messages;
