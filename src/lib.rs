//! Central hub for multi-room live transcription
//!
//! The hub accepts WebSocket connections from two kinds of clients:
//! *producers*, which push interim and final transcript lines for a room,
//! and *viewers*, which watch every room at once. Final lines land in a
//! per-room ordered log; viewers join with a full snapshot of those logs
//! and then receive each new line exactly once, in room order.
//!
//! # Architecture
//!
//! ```text
//!   [Producer ws]──┐                       ┌──────────────────┐
//!   [Producer ws]──┼─► RoomRegistry        │ BroadcastRouter  │
//!   [Producer ws]──┘    per-room logs ────►│ per-viewer mpsc  │
//!                       (append under      │ queues, try_send │
//!                        room lock)        └───┬──────┬───────┘
//!                                              │      │
//!                                              ▼      ▼
//!                                        [Viewer ws] [Viewer ws]
//! ```
//!
//! Fan-out happens inside the room's lock, so every viewer sees a room's
//! entries in append order. Queues are bounded and never awaited while a
//! lock is held; a viewer that stops draining its queue is disconnected
//! rather than allowed to stall the hub.
//!
//! # Quick start
//!
//! ```no_run
//! use transcript_hub::{HubConfig, HubServer};
//!
//! #[tokio::main]
//! async fn main() -> transcript_hub::Result<()> {
//!     let server = HubServer::bind(HubConfig::default()).await?;
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod backup;
pub mod error;
pub mod export;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use export::{ExportService, ExportSnapshot};
pub use protocol::{ClientMessage, ProtocolError, Role, ServerMessage};
pub use registry::{RoomRegistry, SourceType, TranscriptEntry};
pub use router::BroadcastRouter;
pub use server::{HubConfig, HubServer};
pub use session::{CloseReason, ConnectionState};
pub use stats::{HubStats, RoomStats};
