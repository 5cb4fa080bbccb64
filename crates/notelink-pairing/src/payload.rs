//! Scanned QR payload decoding and validation
//!
//! The payload is a JSON object:
//!
//! ```text
//! {"kind":"pair","version":1,"sessionId":"...","token":"...","relayAddress":"wss://..."}
//! ```
//!
//! Text that is not JSON at all is [`ValidationError::Malformed`] (a corrupt
//! or foreign code); JSON of the wrong shape is [`ValidationError::Incompatible`]
//! (another app's code, or a companion speaking a different version).

use notelink_core::{PairingRequest, ValidationError, PAIRING_KIND, PROTOCOL_VERSION};
use serde_json::{Map, Value};

/// Decode and validate a scanned payload
pub fn parse(raw: &str) -> Result<PairingRequest, ValidationError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|_| ValidationError::Malformed)?;

    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::incompatible("payload is not an object"))?;

    match object.get("kind").and_then(Value::as_str) {
        Some(kind) if kind == PAIRING_KIND => {}
        Some(kind) => {
            return Err(ValidationError::incompatible(format!(
                "unknown kind \"{}\"",
                kind
            )))
        }
        None => return Err(ValidationError::incompatible("missing kind")),
    }

    let version = match object.get("version") {
        Some(version) => version
            .as_i64()
            .ok_or_else(|| ValidationError::incompatible("version must be an integer"))?,
        None => return Err(ValidationError::incompatible("missing version")),
    };
    if version != i64::from(PROTOCOL_VERSION) {
        return Err(ValidationError::incompatible(format!("version {}", version)));
    }

    Ok(PairingRequest {
        kind: PAIRING_KIND.to_string(),
        version: PROTOCOL_VERSION,
        session_id: required_string(object, "sessionId")?,
        token: required_string(object, "token")?,
        relay_address: required_string(object, "relayAddress")?,
    })
}

fn required_string(object: &Map<String, Value>, field: &str) -> Result<String, ValidationError> {
    match object.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        Some(_) => Err(ValidationError::incompatible(format!("empty {}", field))),
        None => Err(ValidationError::incompatible(format!("missing {}", field))),
    }
}
