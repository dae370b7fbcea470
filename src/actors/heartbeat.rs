//! HeartbeatActor - Supervises client connection liveness
//!
//! Runs on a fixed period. On each sweep, every registered client is
//! either probed (a ping frame via its outbound channel) or, if it has
//! been silent longer than the timeout, forcibly evicted. Evicting drops
//! the registry's outbound sender, which closes the connection's writer
//! task and tears the socket down.
//!
//! Per-client I/O failures are recoverable: a probe that cannot be sent
//! evicts that one client. The sweep loop itself never terminates because
//! a client is unhealthy.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, instrument, trace, warn};

use crate::actors::broadcaster::BroadcastHandle;
use crate::registry::ConnectionRegistry;

use super::messages::{HeartbeatCommand, ServerMessage};

pub struct HeartbeatActor {
    registry: Arc<ConnectionRegistry>,
    broadcast: BroadcastHandle,
    command_rx: mpsc::Receiver<HeartbeatCommand>,

    /// Probe period
    interval_duration: Duration,

    /// Silence beyond this evicts the client
    timeout: chrono::Duration,
}

impl HeartbeatActor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcast: BroadcastHandle,
        command_rx: mpsc::Receiver<HeartbeatCommand>,
        interval_duration: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            broadcast,
            command_rx,
            interval_duration,
            timeout: chrono::Duration::from_std(timeout).unwrap_or_else(|_| {
                warn!(?timeout, "configured heartbeat timeout out of range, clamping to maximum");
                chrono::Duration::MAX
            }),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting heartbeat actor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                // Timer tick - sweep all clients
                _ = ticker.tick() => {
                    self.sweep().await;
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        HeartbeatCommand::SweepNow { respond_to } => {
                            let evicted = self.sweep().await;
                            let _ = respond_to.send(evicted);
                        }

                        HeartbeatCommand::Shutdown => {
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

        debug!("heartbeat actor stopped");
    }

    /// One liveness sweep. Returns the number of evicted clients.
    async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut evicted = 0;

        for client in self.registry.snapshot().await {
            if now - client.last_heartbeat > self.timeout {
                debug!(id = %client.id, "client timed out, evicting");
                self.registry.unregister(client.id).await;
                evicted += 1;
                continue;
            }

            if client.outbound.try_send(ServerMessage::Probe).is_err() {
                // closed or hopelessly backed up: treat as dead
                debug!(id = %client.id, "probe failed, evicting");
                self.registry.unregister(client.id).await;
                evicted += 1;
            } else {
                trace!(id = %client.id, "probe sent");
            }
        }

        // the evicted may have been the last subscribers
        if evicted > 0 && !self.registry.has_any_subscriber().await {
            if let Err(e) = self.broadcast.stop().await {
                warn!("failed to stop broadcaster after eviction: {e}");
            }
        }

        evicted
    }
}

/// Handle for controlling a HeartbeatActor
#[derive(Clone)]
pub struct HeartbeatHandle {
    sender: mpsc::Sender<HeartbeatCommand>,
}

impl HeartbeatHandle {
    /// Spawn a new heartbeat actor and return its handle.
    pub fn spawn(
        registry: Arc<ConnectionRegistry>,
        broadcast: BroadcastHandle,
        interval_duration: Duration,
        timeout: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = HeartbeatActor::new(registry, broadcast, cmd_rx, interval_duration, timeout);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Trigger an immediate sweep; returns the number of evicted clients.
    pub async fn sweep_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HeartbeatCommand::SweepNow { respond_to: tx })
            .await
            .context("failed to send SweepNow command")?;

        rx.await.context("failed to receive sweep response")
    }

    /// Gracefully shut down the supervisor.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(HeartbeatCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
