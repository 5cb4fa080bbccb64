//! Pairing payload and relay wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Discriminator carried in every pairing QR payload
pub const PAIRING_KIND: &str = "pair";

/// The only payload version this build understands
pub const PROTOCOL_VERSION: u32 = 1;

/// Shown when a relay `error` frame carries no usable message
pub const RELAY_ERROR_FALLBACK: &str = "The pairing relay reported an error";

/// A validated pairing request decoded from a scanned QR code
///
/// Scoped to a single pairing attempt and never persisted.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    /// Always [`PAIRING_KIND`]
    pub kind: String,
    /// Always [`PROTOCOL_VERSION`]
    pub version: u32,
    /// Relay-scoped correlation key
    pub session_id: String,
    /// Single-use bearer credential for the local endpoint
    pub token: String,
    /// URI of the rendezvous relay
    pub relay_address: String,
}

impl PairingRequest {
    /// Build a request for the current protocol version
    pub fn new(
        session_id: impl Into<String>,
        token: impl Into<String>,
        relay_address: impl Into<String>,
    ) -> Self {
        Self {
            kind: PAIRING_KIND.to_string(),
            version: PROTOCOL_VERSION,
            session_id: session_id.into(),
            token: token.into(),
            relay_address: relay_address.into(),
        }
    }

    /// Encode as the JSON text a companion renders into its QR code
    pub fn to_payload(&self) -> String {
        serde_json::json!({
            "kind": self.kind,
            "version": self.version,
            "sessionId": self.session_id,
            "token": self.token,
            "relayAddress": self.relay_address,
        })
        .to_string()
    }
}

impl fmt::Debug for PairingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingRequest")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .field("relay_address", &self.relay_address)
            .finish()
    }
}

/// Address of the started local endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalEndpointInfo {
    /// Host or IP reachable on the local network
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl LocalEndpointInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL for peers on the local network
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for LocalEndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Which side of the rendezvous a relay connection speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayRole {
    Phone,
}

impl RelayRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayRole::Phone => "phone",
        }
    }
}

impl fmt::Display for RelayRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages exchanged with the rendezvous relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayMessage {
    /// Sent once by the phone when the connection opens
    PhoneReady {
        /// Reachable address of the local endpoint
        ip: String,
        /// Local endpoint port
        port: u16,
        /// Bearer token the browser must present
        token: String,
    },
    /// Relay-reported failure
    Error { error: String },
    /// Any message type this build does not know
    #[serde(other)]
    Unknown,
}

impl RelayMessage {
    /// Decode a relay text frame
    ///
    /// The `type` field alone decides an `error` frame; a missing or
    /// non-string `error` falls back to [`RELAY_ERROR_FALLBACK`]. Other types
    /// that do not match a known shape decode as [`RelayMessage::Unknown`].
    /// Returns `None` for frames that are not JSON objects with a string
    /// `type`.
    pub fn decode(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        match value.get("type")?.as_str()? {
            "error" => {
                let error = value
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|e| !e.is_empty())
                    .unwrap_or(RELAY_ERROR_FALLBACK);
                Some(RelayMessage::Error {
                    error: error.to_string(),
                })
            }
            _ => Some(serde_json::from_value(value).unwrap_or(RelayMessage::Unknown)),
        }
    }

    /// The announcement for a started endpoint
    pub fn phone_ready(endpoint: &LocalEndpointInfo, token: &str) -> Self {
        RelayMessage::PhoneReady {
            ip: endpoint.host.clone(),
            port: endpoint.port,
            token: token.to_string(),
        }
    }
}
