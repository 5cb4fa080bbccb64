//! Pairing token checks for the local endpoint
//!
//! The browser presents the token it placed in the pairing QR code, either as
//! an `Authorization: Bearer` header or as a `token` query parameter (for
//! clients that cannot set headers, such as `EventSource`). The server only
//! keeps a digest of the token.

use axum::http::{header, HeaderMap, StatusCode};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Query parameters accepted on every route
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// Pairing token, for clients that cannot send headers
    #[serde(default)]
    pub token: Option<String>,
}

/// SHA-256 digest of a pairing token, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDigest(String);

impl TokenDigest {
    pub fn of(token: &str) -> Self {
        Self(BASE64.encode(Sha256::digest(token.as_bytes())))
    }

    /// Whether `presented` is the token this digest was made from
    pub fn matches(&self, presented: &str) -> bool {
        Self::of(presented) == *self
    }
}

/// Token a request presents; the query parameter wins over the header
pub fn presented_token<'a>(query: &'a TokenQuery, headers: &'a HeaderMap) -> Option<&'a str> {
    query.token.as_deref().or_else(|| {
        headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    })
}

/// Admit only requests carrying this attempt's pairing token
pub fn authorize(
    expected: &TokenDigest,
    query: &TokenQuery,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, &'static str)> {
    match presented_token(query, headers) {
        None => {
            warn!("Rejected request without a pairing token");
            Err((StatusCode::UNAUTHORIZED, "Authentication required"))
        }
        Some(token) if !expected.matches(token) => {
            warn!("Rejected request with a token from another pairing");
            Err((StatusCode::UNAUTHORIZED, "Invalid token"))
        }
        Some(_) => Ok(()),
    }
}
