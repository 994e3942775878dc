//! Statistics for the hub

use std::time::Duration;

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    /// Connections currently tracked (any role)
    pub active_connections: usize,
    /// Currently subscribed viewers
    pub viewers: usize,
    /// Rooms created since startup
    pub rooms: usize,
    /// Entries appended across all rooms since startup
    pub total_entries: u64,
    /// Uptime
    pub uptime: Duration,
}

impl HubStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Average append rate over the whole uptime, entries per minute
    pub fn entries_per_minute(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.total_entries as f64 * 60.0 / secs
        } else {
            0.0
        }
    }
}

/// Per-room statistics
#[derive(Debug, Clone)]
pub struct RoomStats {
    /// Room name
    pub room: String,
    /// Finalized entries in the log
    pub entries: usize,
    /// Producer connections currently attached
    pub live_producers: u32,
    /// Time since the last append or interim update
    pub idle: Duration,
}
