//! Error types for live sessions.

use thiserror::Error;

/// Everything that can go wrong between the host and the live service.
#[derive(Error, Debug)]
pub enum LiveError {
    /// `SetupComplete` did not arrive before the handshake deadline.
    #[error("Handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    /// An inbound message could not be matched to a known frame.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// An outbound frame is missing a required field. Nothing was sent.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Connection-level failure; fatal to the transport that raised it.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected")]
    NotConnected,

    /// The handshake was aborted by a disconnect.
    #[error("Handshake cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session already exists: {0}")]
    DuplicateSession(String),
}

impl LiveError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }
}
