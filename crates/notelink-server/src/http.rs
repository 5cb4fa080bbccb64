//! HTTP request handlers
//!
//! The local endpoint's API surface. Every route requires the pairing token.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use notelink_core::LocalEndpointInfo;
use serde::Serialize;
use std::net::UdpSocket;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::auth::{authorize, TokenDigest, TokenQuery};

/// Shared state for one running endpoint
pub struct EndpointState {
    /// Digest of the pairing token
    token: TokenDigest,
    /// Where peers reach us
    pub endpoint: LocalEndpointInfo,
    /// Device name shown to the browser
    pub name: String,
}

impl EndpointState {
    pub fn new(token: &str, endpoint: LocalEndpointInfo) -> Self {
        Self {
            token: TokenDigest::of(token),
            endpoint,
            name: device_name(),
        }
    }

    fn authorize(
        &self,
        query: &TokenQuery,
        headers: &HeaderMap,
    ) -> Result<(), (StatusCode, &'static str)> {
        authorize(&self.token, query, headers)
    }
}

/// Create the endpoint router
pub fn create_router(state: Arc<EndpointState>) -> Router {
    Router::new()
        .route("/api/info", get(info_handler))
        .route("/api/ping", get(ping_handler))
        // The browser companion calls us from its own origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Endpoint information response
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    /// Device name
    pub name: String,
    /// Server version
    pub version: String,
    /// Advertised host
    pub host: String,
    /// Listening port
    pub port: u16,
}

/// Get endpoint information
async fn info_handler(
    State(state): State<Arc<EndpointState>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<EndpointInfo>, (StatusCode, &'static str)> {
    state.authorize(&query, &headers)?;

    Ok(Json(EndpointInfo {
        name: state.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        host: state.endpoint.host.clone(),
        port: state.endpoint.port,
    }))
}

/// Liveness check for the paired browser
async fn ping_handler(
    State(state): State<Arc<EndpointState>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, &'static str)> {
    state.authorize(&query, &headers)?;
    debug!("Ping from paired browser");
    Ok(Json(serde_json::json!({ "ok": true })))
}

fn device_name() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("NoteLink-{}", hostname)
}

/// Get the primary local IP address
///
/// Connecting a UDP socket sends nothing but makes the OS pick the
/// interface it would route through.
pub fn get_local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_unspecified() {
        return None;
    }
    Some(addr.ip().to_string())
}
