//! Protocol error types
//!
//! Error types for inbound message handling. These cover violations a client
//! can commit over the wire; none of them tear the connection down on their
//! own.

/// Error type for inbound message handling
#[derive(Debug, Clone)]
pub enum ProtocolError {
    /// Payload was not valid JSON or did not match any known message type
    Malformed(String),
    /// Recognized message with a field that failed validation
    Validation(&'static str),
    /// A `register` arrived on a connection whose role is already fixed
    DuplicateRegistration,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Malformed(detail) => write!(f, "Malformed message: {}", detail),
            ProtocolError::Validation(rule) => write!(f, "Invalid message: {}", rule),
            ProtocolError::DuplicateRegistration => {
                write!(f, "Connection is already registered; role cannot change")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}
