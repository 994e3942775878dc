//! Wire message codec
//!
//! All traffic is JSON text frames over a persistent WebSocket, tagged by a
//! `"type"` field. Inbound messages are parsed into a closed set of variants
//! and validated before any state is touched; outbound messages serialize
//! once into a refcounted [`Utf8Bytes`] payload so fan-out to N viewers never
//! re-encodes.
//!
//! Unknown fields on known message types are tolerated; unknown `"type"`
//! values are rejected as malformed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::export::ExportSnapshot;
use crate::registry::{SourceType, TranscriptEntry};

use super::error::ProtocolError;

/// Role requested by a `register` message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Appends transcript lines to one room
    Producer,
    /// Receives all rooms, read-only
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

/// Producer-presence state carried by `room_status` broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomPresence {
    /// First producer attached to the room
    Connected,
    /// Last producer detached from the room
    Disconnected,
}

/// Messages accepted from clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Fix the connection's role; producers may name their room up front
    Register {
        role: Role,
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        source: Option<SourceType>,
    },
    /// Finalized transcript line, appended to the room's log
    Final {
        room: String,
        text: String,
        timestamp: f64,
    },
    /// In-progress utterance preview, ephemeral
    Interim {
        room: String,
        text: String,
        timestamp: f64,
    },
    /// Request the point-in-time export document
    Export,
}

impl ClientMessage {
    /// Parse and validate one inbound text frame
    ///
    /// Validation runs to completion before the caller mutates anything, so
    /// a rejected message leaves no partial state behind.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let msg: ClientMessage =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::Register { room, .. } => {
                if let Some(room) = room {
                    if room.trim().is_empty() {
                        return Err(ProtocolError::Validation("room name must be non-empty"));
                    }
                }
                Ok(())
            }
            ClientMessage::Final {
                room,
                text,
                timestamp,
            }
            | ClientMessage::Interim {
                room,
                text,
                timestamp,
            } => {
                if room.trim().is_empty() {
                    return Err(ProtocolError::Validation("room name must be non-empty"));
                }
                if text.trim().is_empty() {
                    return Err(ProtocolError::Validation("text must be non-empty"));
                }
                // 1e999 and friends parse as infinity rather than failing
                if !timestamp.is_finite() || *timestamp < 0.0 {
                    return Err(ProtocolError::Validation(
                        "timestamp must be a finite non-negative number",
                    ));
                }
                Ok(())
            }
            ClientMessage::Export => Ok(()),
        }
    }
}

/// Messages sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Viewer-join snapshot: full transcript state as of subscription time
    Snapshot {
        session_start: String,
        rooms: BTreeMap<String, Vec<TranscriptEntry>>,
    },
    /// One newly appended entry, delivered exactly once per viewer
    Entry(TranscriptEntry),
    /// Live utterance preview, not replayed to late joiners
    Interim {
        room: String,
        text: String,
        timestamp: f64,
    },
    /// Producer presence changed for a room
    RoomStatus { room: String, status: RoomPresence },
    /// Reply to an `export` request
    Export(ExportSnapshot),
    /// Protocol violation reply; the connection stays open
    Error { message: String },
}

impl ServerMessage {
    /// Build an error reply
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize to a text frame payload
    ///
    /// The returned [`Utf8Bytes`] is refcounted: cloning it per viewer shares
    /// the underlying buffer.
    pub fn encode(&self) -> Utf8Bytes {
        match serde_json::to_string(self) {
            Ok(s) => Utf8Bytes::from(s),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode outbound message");
                Utf8Bytes::from_static(r#"{"type":"error","message":"internal encoding failure"}"#)
            }
        }
    }
}
