//! Connection tracking
//!
//! One [`ConnHandle`] per live connection, keyed by id. The tracker hands out
//! ids, lets the liveness monitor walk every connection, and turns kick
//! requests into a one-shot shutdown signal that the connection's own reader
//! task acts on. All teardown work stays in the connection task; the tracker
//! only ever flips the switch.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::router::OutboundItem;
use crate::session::{CloseReason, ConnectionState};

/// Tracked pieces of one live connection
struct ConnHandle {
    /// Shared connection state (role, heartbeat, registered room)
    state: Arc<RwLock<ConnectionState>>,

    /// The connection's outbound queue, for monitor pings
    outbound: mpsc::Sender<OutboundItem>,

    /// Fires the connection's reader loop shutdown; consumed by the first kick
    shutdown: Option<oneshot::Sender<CloseReason>>,
}

/// Registry of live connections
pub struct ConnectionTracker {
    connections: RwLock<HashMap<u64, ConnHandle>>,
    next_id: AtomicU64,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Track a freshly accepted connection
    ///
    /// Returns the assigned id, the shared state, and the shutdown receiver
    /// the connection's reader loop must select on.
    pub async fn register(
        &self,
        peer_addr: SocketAddr,
        outbound: mpsc::Sender<OutboundItem>,
    ) -> (u64, Arc<RwLock<ConnectionState>>, oneshot::Receiver<CloseReason>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(RwLock::new(ConnectionState::new(id, peer_addr)));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let mut connections = self.connections.write().await;
        connections.insert(
            id,
            ConnHandle {
                state: Arc::clone(&state),
                outbound,
                shutdown: Some(shutdown_tx),
            },
        );

        tracing::debug!(connection_id = id, peer = %peer_addr, connections = connections.len(), "Connection tracked");
        (id, state, shutdown_rx)
    }

    /// Ask a connection to shut down
    ///
    /// Idempotent: only the first kick per connection fires the signal.
    /// Returns whether a signal was actually delivered.
    pub async fn kick(&self, id: u64, reason: CloseReason) -> bool {
        let mut connections = self.connections.write().await;
        if let Some(handle) = connections.get_mut(&id) {
            if let Some(shutdown) = handle.shutdown.take() {
                return shutdown.send(reason).is_ok();
            }
        }
        false
    }

    /// Ask every tracked connection to shut down
    pub async fn kick_all(&self, reason: CloseReason) {
        let mut connections = self.connections.write().await;
        let mut kicked = 0usize;
        for handle in connections.values_mut() {
            if let Some(shutdown) = handle.shutdown.take() {
                if shutdown.send(reason).is_ok() {
                    kicked += 1;
                }
            }
        }
        if kicked > 0 {
            tracing::info!(connections = kicked, reason = %reason, "All connections asked to close");
        }
    }

    /// Stop tracking a connection
    ///
    /// Called from the connection's own teardown; idempotent.
    pub async fn remove(&self, id: u64) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&id).is_some();
        if removed {
            tracing::debug!(connection_id = id, connections = connections.len(), "Connection untracked");
        }
        removed
    }

    /// Snapshot of every live connection for the liveness sweep
    pub async fn handles(
        &self,
    ) -> Vec<(u64, Arc<RwLock<ConnectionState>>, mpsc::Sender<OutboundItem>)> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .map(|(&id, handle)| (id, Arc::clone(&handle.state), handle.outbound.clone()))
            .collect()
    }

    /// Number of tracked connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
