//! Error types for NoteLink pairing

use thiserror::Error;

/// A scanned payload that cannot become a [`PairingRequest`](crate::PairingRequest)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The scanned text is not decodable structured text
    #[error("This is not a valid pairing code")]
    Malformed,

    /// Decodable, but the wrong kind, version or shape
    #[error(
        "Unsupported pairing code ({reason}); expected kind \"{expected_kind}\" version {expected_version}"
    )]
    Incompatible {
        reason: String,
        expected_kind: &'static str,
        expected_version: u32,
    },
}

impl ValidationError {
    /// Create an incompatibility error against the current protocol
    pub fn incompatible(reason: impl Into<String>) -> Self {
        ValidationError::Incompatible {
            reason: reason.into(),
            expected_kind: crate::protocol::PAIRING_KIND,
            expected_version: crate::protocol::PROTOCOL_VERSION,
        }
    }
}

/// The local endpoint could not be started
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Permission denied while starting the local server: {0}")]
    PermissionDenied(String),

    #[error("Failed to bind the local server: {0}")]
    Bind(#[from] std::io::Error),

    #[error("No reachable network address for the local server")]
    NoNetwork,
}

/// The relay rendezvous failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Relay unreachable or the connection failed underneath us; the
    /// detail is kept for logs, the message stays generic
    #[error("Could not reach the pairing relay")]
    Transport(String),

    /// The relay reported an error; shown verbatim
    #[error("{0}")]
    Relay(String),
}

/// Any failure of a pairing attempt
#[derive(Error, Debug)]
pub enum PairingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}
