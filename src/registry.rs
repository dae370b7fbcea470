//! Connection registry
//!
//! Owns the set of live client connections and their subscription state.
//! This is the only concurrently-mutated shared resource in the hub: the
//! WebSocket tasks, the broadcast actor and the heartbeat actor all go
//! through it. Mutations are serialized behind an internal `RwLock`; the
//! raw map is never exposed. Iterating callers take a `snapshot()` so no
//! lock is ever held across a network send.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};

use crate::actors::messages::ServerMessage;

/// Outbound buffer per connection. A client that falls this many messages
/// behind starts dropping updates instead of delaying everyone else.
pub const OUTBOUND_BUFFER: usize = 64;

/// Opaque client identifier, unique for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

struct ClientEntry {
    subscriptions: HashSet<String>,
    last_heartbeat: DateTime<Utc>,
    outbound: mpsc::Sender<ServerMessage>,
}

/// Read-consistent copy of one client's state, safe to iterate without
/// holding the registry lock.
#[derive(Clone)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub subscriptions: HashSet<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub outbound: mpsc::Sender<ServerMessage>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh client with empty subscriptions and a heartbeat of
    /// now. The registry keeps the outbound sender; dropping the entry
    /// closes the connection's writer.
    pub async fn register(&self, outbound: mpsc::Sender<ServerMessage>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut clients = self.clients.write().await;
        clients.insert(
            id,
            ClientEntry {
                subscriptions: HashSet::new(),
                last_heartbeat: Utc::now(),
                outbound,
            },
        );

        debug!(%id, total = clients.len(), "client registered");
        id
    }

    /// Remove a client. Idempotent: disconnects racing with heartbeat
    /// eviction must not fail. Returns whether an entry was removed.
    pub async fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            debug!(%id, "client unregistered");
        }
        removed
    }

    /// Union the given stream names into the client's subscription set and
    /// return the resulting full set. `None` if the client is unknown.
    pub async fn add_subscriptions(
        &self,
        id: ClientId,
        streams: &[String],
    ) -> Option<HashSet<String>> {
        let mut clients = self.clients.write().await;
        let entry = clients.get_mut(&id)?;
        entry.subscriptions.extend(streams.iter().cloned());
        trace!(%id, count = entry.subscriptions.len(), "subscriptions added");
        Some(entry.subscriptions.clone())
    }

    /// Remove the given stream names from the client's subscription set and
    /// return the remaining set. `None` if the client is unknown.
    pub async fn remove_subscriptions(
        &self,
        id: ClientId,
        streams: &[String],
    ) -> Option<HashSet<String>> {
        let mut clients = self.clients.write().await;
        let entry = clients.get_mut(&id)?;
        for stream in streams {
            entry.subscriptions.remove(stream);
        }
        trace!(%id, count = entry.subscriptions.len(), "subscriptions removed");
        Some(entry.subscriptions.clone())
    }

    /// Replace the client's subscription set wholesale. `None` if the
    /// client is unknown; the registry itself is unaffected either way.
    pub async fn set_subscriptions(
        &self,
        id: ClientId,
        streams: HashSet<String>,
    ) -> Option<HashSet<String>> {
        let mut clients = self.clients.write().await;
        let entry = clients.get_mut(&id)?;
        entry.subscriptions = streams;
        Some(entry.subscriptions.clone())
    }

    /// Update the client's heartbeat timestamp. No-op if unknown.
    pub async fn touch(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get_mut(&id) {
            Some(entry) => {
                entry.last_heartbeat = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn subscriptions_of(&self, id: ClientId) -> Option<HashSet<String>> {
        self.clients
            .read()
            .await
            .get(&id)
            .map(|entry| entry.subscriptions.clone())
    }

    /// Atomic copy-out of all clients, ordered by id. The broadcast and
    /// heartbeat loops iterate this instead of the live map.
    pub async fn snapshot(&self) -> Vec<ClientSnapshot> {
        let clients = self.clients.read().await;
        let mut snapshot: Vec<ClientSnapshot> = clients
            .iter()
            .map(|(id, entry)| ClientSnapshot {
                id: *id,
                subscriptions: entry.subscriptions.clone(),
                last_heartbeat: entry.last_heartbeat,
                outbound: entry.outbound.clone(),
            })
            .collect();
        snapshot.sort_by_key(|client| client.id);
        snapshot
    }

    /// True iff at least one client has a non-empty subscription set.
    pub async fn has_any_subscriber(&self) -> bool {
        self.clients
            .read()
            .await
            .values()
            .any(|entry| !entry.subscriptions.is_empty())
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Queue a message for one client without blocking. Dropped on a full
    /// buffer (slow consumer); returns `false` only when the client is
    /// unknown or its connection is gone.
    pub async fn send_to(&self, id: ClientId, message: ServerMessage) -> bool {
        let outbound = {
            let clients = self.clients.read().await;
            match clients.get(&id) {
                Some(entry) => entry.outbound.clone(),
                None => return false,
            }
        };

        match outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(%id, "outbound buffer full, dropping message");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
