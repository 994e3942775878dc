//! Wire protocol for the hub
//!
//! Every client (producer or viewer) speaks the same protocol: JSON text
//! frames over a persistent WebSocket, each carrying a `"type"` tag. Inbound
//! frames are validated up front so that nothing downstream ever handles an
//! empty room name, blank text, or a non-finite timestamp.

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{ClientMessage, Role, RoomPresence, ServerMessage};
