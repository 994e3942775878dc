//! Transcript entry types for room routing
//!
//! This module defines the immutable log record stored per room and fanned
//! out to viewers. The same type travels on the wire, tagged with its room
//! and per-room sequence number.

use serde::{Deserialize, Serialize};

/// Kind of producer that captured a transcript line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// On-site capture agent
    #[default]
    Agent,
    /// Browser-based mobile client
    Mobile,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Agent => write!(f, "agent"),
            SourceType::Mobile => write!(f, "mobile"),
        }
    }
}

/// A finalized transcript line in a room's log
///
/// Immutable once created. `sequence` is assigned by the room session under
/// its lock: strictly increasing per room, no gaps, never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Room this entry belongs to
    pub room: String,
    /// Finalized transcript text
    pub text: String,
    /// Producer-reported capture time, epoch seconds
    pub timestamp: f64,
    /// Kind of producer that captured the line
    #[serde(default)]
    pub source: SourceType,
    /// Per-room monotonic sequence number
    pub sequence: u64,
}

impl TranscriptEntry {
    /// Create an entry with an already-assigned sequence number
    pub fn new(
        room: impl Into<String>,
        text: impl Into<String>,
        timestamp: f64,
        source: SourceType,
        sequence: u64,
    ) -> Self {
        Self {
            room: room.into(),
            text: text.into(),
            timestamp,
            source,
            sequence,
        }
    }
}
