//! Room registry for transcript aggregation
//!
//! The registry owns every room's ordered transcript log and is the single
//! coordination point between producers appending lines and viewers receiving
//! them. Serialization is per room, never global.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<RoomRegistry>
//!                     ┌───────────────────────────┐
//!                     │ rooms: HashMap<name,      │
//!                     │   Arc<RwLock<RoomSession{ │
//!                     │     entries: Vec<Entry>,  │
//!                     │     next_sequence,        │
//!                     │     current_utterance,    │
//!                     │   }>>                     │
//!                     │ >                         │
//!                     └────────────┬──────────────┘
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          │                       │                       │
//!          ▼                       ▼                       ▼
//!     [Producer]              [Producer]               [Export]
//!     append("Hall A", …)     append("Workshop", …)    snapshot_all()
//!          │                       │
//!          └──► router.publish() ──┴──► per-viewer queues ──► WS
//! ```
//!
//! # Ordering
//!
//! `append` assigns the room's next sequence number and hands the entry to
//! the router before releasing the room's lock. Broadcast order per room is
//! therefore always append order, even with several producers feeding the
//! same room. Nothing orders entries across rooms.

pub mod entry;
pub mod room;
pub mod store;

pub use entry::{SourceType, TranscriptEntry};
pub use room::{RoomSession, Utterance};
pub use store::RoomRegistry;
