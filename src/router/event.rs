//! Outbound queue items
//!
//! Everything a connection's writer task can be asked to put on the socket
//! travels through one bounded queue as an [`OutboundItem`]. Payloads are
//! pre-encoded [`Utf8Bytes`], so enqueueing for N viewers shares one buffer
//! instead of serializing N times.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Highest snapshot-covered sequence per room
///
/// An entry is part of a viewer's join snapshot iff its sequence is `<=` the
/// watermark recorded for its room. Rooms created after the snapshot have no
/// watermark, so everything from them passes the filter.
pub type Watermarks = HashMap<String, u64>;

/// One unit of outbound work for a connection's writer task
#[derive(Debug, Clone)]
pub enum OutboundItem {
    /// Viewer-join snapshot plus the watermarks that bound it
    ///
    /// Enqueued exactly once per viewer, by the connection's own handler,
    /// after the router subscription is in place. Until it arrives the writer
    /// holds back queued `Entry` items; afterwards it forwards only entries
    /// above the watermark, which makes join delivery exactly-once.
    Snapshot {
        payload: Utf8Bytes,
        watermarks: Watermarks,
    },

    /// One durable appended entry
    ///
    /// `room` and `sequence` exist solely for the join filter; the wire bytes
    /// are already in `payload`.
    Entry {
        room: Arc<str>,
        sequence: u64,
        payload: Utf8Bytes,
    },

    /// Ephemeral broadcast or direct reply (interim, room status, export,
    /// error); never join-filtered, dropped rather than buffered when the
    /// viewer cannot keep up
    Direct(Utf8Bytes),

    /// Liveness check; the writer emits a WebSocket ping frame
    Ping,

    /// Reply to a client ping, echoing its payload
    Pong(Bytes),
}
