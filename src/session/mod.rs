//! Per-connection session state
//!
//! One [`ConnectionState`] exists per accepted WebSocket, owned by the
//! connection tracker and shared with the connection's own tasks. Sessions
//! are deliberately thin: everything durable lives in the room registry.

pub mod state;

pub use state::{CloseReason, ConnectionRole, ConnectionState};
