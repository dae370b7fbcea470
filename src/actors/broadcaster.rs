//! BroadcastActor - Periodic push of fresh data slices to subscribers
//!
//! ## Idle/Active State Machine
//!
//! The broadcast timer only runs while the engine is ACTIVE. The router
//! arms it on the first subscribe when the room was previously empty and
//! disarms it when the last subscriber leaves, so an idle hub does zero
//! periodic work. `Start` while active and `Stop` while idle are no-ops.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → latest window → group by stream → snapshot registry
//!     → per client: intersect subscriptions → try_send data_update
//!     ↑
//!     └─── Commands (Start, Stop, TickNow, Status, Shutdown)
//! ```
//!
//! Sends go into each connection's bounded mpsc without waiting: a slow
//! client drops its own update, a closed connection is evicted, and the
//! tick continues for everyone else.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::registry::ConnectionRegistry;
use crate::source::SampleSource;
use crate::{SensorRecord, StreamSample};

use super::messages::{BroadcastCommand, BroadcastStatus, ServerMessage};

/// Consecutive source failures before the tick error escalates to a
/// persistent health warning.
const SOURCE_FAILURE_WARN_THRESHOLD: u32 = 3;

pub struct BroadcastActor {
    source: Arc<dyn SampleSource>,
    registry: Arc<ConnectionRegistry>,
    command_rx: mpsc::Receiver<BroadcastCommand>,

    /// Tick period while active
    interval_duration: Duration,

    /// Samples fetched per tick
    window_len: usize,

    active: bool,

    /// Monotonically increasing tag on every data_update
    update_count: u64,

    consecutive_source_failures: u32,
}

impl BroadcastActor {
    pub fn new(
        source: Arc<dyn SampleSource>,
        registry: Arc<ConnectionRegistry>,
        command_rx: mpsc::Receiver<BroadcastCommand>,
        interval_duration: Duration,
        window_len: usize,
    ) -> Self {
        Self {
            source,
            registry,
            command_rx,
            interval_duration,
            window_len,
            active: false,
            update_count: 0,
            consecutive_source_failures: 0,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or the command channel is
    /// closed.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting broadcast actor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                // Timer tick - only while active
                _ = ticker.tick(), if self.active => {
                    self.tick().await;
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        BroadcastCommand::Start => {
                            if self.active {
                                trace!("already active, ignoring start");
                            } else {
                                debug!("broadcast engine: idle -> active");
                                self.active = true;
                                // fresh interval so the first tick fires
                                // immediately after activation
                                ticker = interval(self.interval_duration);
                            }
                        }

                        BroadcastCommand::Stop => {
                            if self.active {
                                debug!("broadcast engine: active -> idle");
                                self.active = false;
                            } else {
                                trace!("already idle, ignoring stop");
                            }
                        }

                        BroadcastCommand::TickNow { respond_to } => {
                            self.tick().await;
                            let _ = respond_to.send(());
                        }

                        BroadcastCommand::Status { respond_to } => {
                            let _ = respond_to.send(BroadcastStatus {
                                active: self.active,
                                update_count: self.update_count,
                            });
                        }

                        BroadcastCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // Command channel closed - exit
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("broadcast actor stopped");
    }

    /// One broadcast tick: fetch the latest window and deliver each
    /// subscriber the slice it asked for.
    ///
    /// Source errors abandon this tick; the next one retries independently.
    async fn tick(&mut self) {
        let window = match self.source.latest_window(self.window_len).await {
            Ok(window) => window,
            Err(e) => {
                self.consecutive_source_failures += 1;
                if self.consecutive_source_failures >= SOURCE_FAILURE_WARN_THRESHOLD {
                    warn!(
                        failures = self.consecutive_source_failures,
                        "sample source failing persistently: {e}"
                    );
                } else {
                    error!("failed to fetch sample window, skipping tick: {e}");
                }
                return;
            }
        };
        self.consecutive_source_failures = 0;

        if window.is_empty() {
            trace!("no samples in source, skipping tick");
            return;
        }

        let slices = group_by_stream(&window);
        self.update_count += 1;
        let timestamp = Utc::now();
        let mut evicted = false;

        for client in self.registry.snapshot().await {
            let selected: BTreeMap<String, Vec<StreamSample>> = slices
                .iter()
                .filter(|(name, _)| client.subscriptions.contains(name.as_str()))
                .map(|(name, samples)| (name.clone(), samples.clone()))
                .collect();

            // no spurious empty messages
            if selected.is_empty() {
                continue;
            }

            let message = ServerMessage::DataUpdate {
                data: selected,
                timestamp,
                update_count: self.update_count,
            };

            match client.outbound.try_send(message) {
                Ok(()) => {
                    trace!(id = %client.id, "data update queued");
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // slow consumer drops its own update; nobody waits
                    debug!(id = %client.id, "outbound buffer full, dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(id = %client.id, "connection gone, evicting client");
                    self.registry.unregister(client.id).await;
                    evicted = true;
                }
            }
        }

        // the evicted may have been the last subscribers; disarm without
        // waiting for the socket teardown path
        if evicted && self.active && !self.registry.has_any_subscriber().await {
            debug!("no subscribers left after eviction, broadcast engine: active -> idle");
            self.active = false;
        }
    }
}

/// Group a window of records into per-stream ordered sample sequences.
/// Metadata and control fields never appear as stream names.
fn group_by_stream(window: &[SensorRecord]) -> BTreeMap<String, Vec<StreamSample>> {
    let mut slices: BTreeMap<String, Vec<StreamSample>> = BTreeMap::new();
    for record in window {
        for (name, sample) in record.samples() {
            slices.entry(name.to_string()).or_default().push(sample);
        }
    }
    slices
}

/// Handle for controlling a BroadcastActor
///
/// Cloneable; every WebSocket task holds one.
#[derive(Clone)]
pub struct BroadcastHandle {
    sender: mpsc::Sender<BroadcastCommand>,
}

impl BroadcastHandle {
    /// Spawn a new broadcast actor in the IDLE state and return its handle.
    pub fn spawn(
        source: Arc<dyn SampleSource>,
        registry: Arc<ConnectionRegistry>,
        interval_duration: Duration,
        window_len: usize,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = BroadcastActor::new(source, registry, cmd_rx, interval_duration, window_len);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Arm the broadcast timer. Idempotent.
    pub async fn start(&self) -> Result<()> {
        self.sender
            .send(BroadcastCommand::Start)
            .await
            .context("failed to send Start command")?;
        Ok(())
    }

    /// Disarm the broadcast timer. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        self.sender
            .send(BroadcastCommand::Stop)
            .await
            .context("failed to send Stop command")?;
        Ok(())
    }

    /// Run a single tick immediately, bypassing the timer.
    pub async fn tick_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BroadcastCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("failed to receive tick response")?;
        Ok(())
    }

    /// Query the engine state.
    pub async fn status(&self) -> Result<BroadcastStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BroadcastCommand::Status { respond_to: tx })
            .await
            .context("failed to send Status command")?;

        rx.await.context("failed to receive status response")
    }

    /// Gracefully shut down the broadcaster.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(BroadcastCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
