//! NoteLink Core - Shared types and protocol definitions
//!
//! This crate provides the wire types, the error taxonomy and the configuration
//! used by the pairing handshake and the local endpoint.

pub mod config;
pub mod error;
pub mod protocol;

pub use config::PairingConfig;
pub use error::{HandshakeError, LaunchError, PairingError, ValidationError};
pub use protocol::{
    LocalEndpointInfo, PairingRequest, RelayMessage, RelayRole, PAIRING_KIND, PROTOCOL_VERSION,
    RELAY_ERROR_FALLBACK,
};
