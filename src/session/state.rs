//! Connection state
//!
//! Tracks one client connection from WebSocket accept to removal. The role
//! is fixed by the first classifying message and immutable afterwards; room
//! data never lives here, so tearing a connection down can never lose
//! transcripts.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::protocol::{ProtocolError, Role};
use crate::registry::SourceType;

/// Role a connection settles into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Accepted, no classifying message seen yet
    Unclassified,
    /// Appends transcript lines
    Producer,
    /// Receives all rooms, read-only
    Viewer,
}

impl From<Role> for ConnectionRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Producer => ConnectionRole::Producer,
            Role::Viewer => ConnectionRole::Viewer,
        }
    }
}

/// Why a connection was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the socket or the socket failed
    Disconnected,
    /// Heartbeat lapsed, or the connection never classified itself in time
    TimedOut,
    /// Outbound queue overflowed; the viewer could not keep up
    SlowConsumer,
    /// Hub is shutting down
    ServerShutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Disconnected => write!(f, "disconnected"),
            CloseReason::TimedOut => write!(f, "timed out"),
            CloseReason::SlowConsumer => write!(f, "slow consumer"),
            CloseReason::ServerShutdown => write!(f, "server shutdown"),
        }
    }
}

/// Complete per-connection state
#[derive(Debug)]
pub struct ConnectionState {
    /// Unique connection ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current role; starts unclassified
    pub role: ConnectionRole,

    /// Accept time
    pub connected_at: Instant,

    /// Last inbound frame of any kind
    pub last_heartbeat: Instant,

    /// Room a producer registered against, for presence accounting
    pub registered_room: Option<String>,

    /// Transcript source label from registration
    pub source: SourceType,
}

impl ConnectionState {
    /// Create state for a freshly accepted connection
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            peer_addr,
            role: ConnectionRole::Unclassified,
            connected_at: now,
            last_heartbeat: now,
            registered_room: None,
            source: SourceType::default(),
        }
    }

    /// Fix the connection's role; the first classification wins
    ///
    /// A second attempt fails and leaves the existing role untouched,
    /// whatever role it asks for.
    pub fn classify(&mut self, role: Role) -> Result<(), ProtocolError> {
        if self.role != ConnectionRole::Unclassified {
            return Err(ProtocolError::DuplicateRegistration);
        }
        self.role = role.into();
        Ok(())
    }

    /// Whether the first classifying message has arrived
    pub fn is_classified(&self) -> bool {
        self.role != ConnectionRole::Unclassified
    }

    /// Record inbound activity
    pub fn touch(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    /// Whether the last inbound activity is older than `timeout`
    pub fn heartbeat_lapsed(&self, timeout: Duration) -> bool {
        self.last_heartbeat.elapsed() > timeout
    }

    /// Time since accept
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
