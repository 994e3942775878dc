//! Per-room session state
//!
//! A [`RoomSession`] is the authoritative, append-only transcript log for one
//! named room. It is created once on first touch and lives for the process
//! lifetime; producers come and go, the log stays. All mutation happens
//! through the registry while holding this room's lock.

use std::time::Instant;

use super::entry::{SourceType, TranscriptEntry};

/// Ephemeral in-progress utterance preview
///
/// Updated by `interim` messages, replaced or cleared by the next `final`.
/// Never appended to the log, never included in snapshots or exports.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Preview text as currently recognized
    pub text: String,
    /// Producer-reported time of the update, epoch seconds
    pub timestamp: f64,
}

/// Append-only transcript log for a single room
#[derive(Debug)]
pub struct RoomSession {
    /// Room name (unique, case-sensitive key in the registry)
    name: String,

    /// Finalized entries in append order
    entries: Vec<TranscriptEntry>,

    /// Next sequence number to assign
    next_sequence: u64,

    /// Current in-progress utterance, if a producer is mid-sentence
    current_utterance: Option<Utterance>,

    /// Number of producer connections registered against this room
    live_producers: u32,

    /// When the room was first created
    created_at: Instant,

    /// Last append or interim update
    last_activity: Instant,
}

impl RoomSession {
    /// Create an empty session for `name`
    pub fn new(name: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            entries: Vec::new(),
            next_sequence: 0,
            current_utterance: None,
            live_producers: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Room name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a finalized transcript line, assigning the next sequence number
    ///
    /// Also clears the current utterance: the preview this line grew out of
    /// is now resolved.
    pub fn append(&mut self, text: impl Into<String>, timestamp: f64, source: SourceType) -> TranscriptEntry {
        let entry = TranscriptEntry::new(self.name.clone(), text, timestamp, source, self.next_sequence);
        self.next_sequence += 1;
        self.entries.push(entry.clone());
        self.current_utterance = None;
        self.last_activity = Instant::now();
        entry
    }

    /// Replace the ephemeral in-progress utterance
    pub fn set_utterance(&mut self, text: impl Into<String>, timestamp: f64) {
        self.current_utterance = Some(Utterance {
            text: text.into(),
            timestamp,
        });
        self.last_activity = Instant::now();
    }

    /// Current in-progress utterance, if any
    pub fn current_utterance(&self) -> Option<&Utterance> {
        self.current_utterance.as_ref()
    }

    /// Immutable copy of all entries as of now
    ///
    /// Entries appended after this call are not reflected in the returned
    /// vector. The current utterance is deliberately excluded.
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries.clone()
    }

    /// Sequence number of the newest entry, if the log is non-empty
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.last().map(|e| e.sequence)
    }

    /// Number of finalized entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log has no finalized entries yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a producer connection registering against this room
    ///
    /// Returns true if this was the first live producer (0 → 1).
    pub fn attach_producer(&mut self) -> bool {
        self.live_producers += 1;
        self.live_producers == 1
    }

    /// Record a registered producer connection going away
    ///
    /// Returns true if this was the last live producer (1 → 0).
    pub fn detach_producer(&mut self) -> bool {
        if self.live_producers == 0 {
            return false;
        }
        self.live_producers -= 1;
        self.live_producers == 0
    }

    /// Number of producer connections currently registered against this room
    pub fn live_producers(&self) -> u32 {
        self.live_producers
    }

    /// Age of the room since creation
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Time since the last append or interim update
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}
