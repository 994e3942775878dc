//! Viewer fan-out routing
//!
//! The router owns the set of live viewer queues and pushes pre-encoded
//! payloads into them. It never touches sockets itself and never blocks:
//! per-viewer writer tasks drain the queues, and a stalled viewer is cut
//! loose through the kick channel instead of back-pressuring producers.
//!
//! # Architecture
//!
//! ```text
//!   RoomRegistry::append()            Arc<BroadcastRouter>
//!   (room lock held)              ┌──────────────────────────┐
//!        │                       │ viewers: HashMap<id,      │
//!        └── publish(entry) ────►│   mpsc::Sender<Outbound>> │
//!                                └──────┬───────────┬────────┘
//!                              try_send │           │ try_send
//!                                       ▼           ▼
//!                                 [writer task] [writer task]
//!                                  ws.send()     ws.send()
//!                                       │           │
//!                                       ▼           ▼
//!                                    viewer       viewer
//! ```
//!
//! Payloads are serialized once per broadcast; the `Utf8Bytes` handed to each
//! queue share the same refcounted buffer.

pub mod event;
pub mod fanout;

pub use event::{OutboundItem, Watermarks};
pub use fanout::BroadcastRouter;
