//! NoteLink Pairing - QR pairing handshake with a browser companion
//!
//! The phone scans a QR code shown by the browser, starts a local endpoint
//! authenticated by the token in that code, and announces the endpoint's
//! address to the browser through a rendezvous relay.
//!
//! # Pairing Flow
//!
//! 1. A scan event hands the raw text to [`PairingController::on_scan`]
//! 2. [`payload::parse`] validates it into a [`PairingRequest`](notelink_core::PairingRequest)
//! 3. The [`LocalEndpointLauncher`] starts a server accepting only that token
//! 4. [`RelayClient`] connects to the relay as the `phone` and sends `phone-ready`
//! 5. When the relay closes cleanly, [`SessionHandoff::on_paired`] receives the address
//!
//! # Example
//!
//! ```no_run
//! use notelink_pairing::{ChannelHandoff, PairingController, RelayClient};
//! # use notelink_pairing::LocalEndpointLauncher;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn example(launcher: Arc<dyn LocalEndpointLauncher>, scanned: &str) {
//!     let (handoff, paired) = ChannelHandoff::new();
//!     let controller = PairingController::new(
//!         launcher,
//!         Arc::new(handoff),
//!         RelayClient::new(Duration::from_secs(10)),
//!     );
//!
//!     controller.on_scan(scanned);
//!     if let Ok(endpoint) = paired.await {
//!         println!("Browser will connect to {}", endpoint.base_url());
//!     }
//! }
//! ```

pub mod controller;
pub mod handoff;
pub mod launcher;
pub mod payload;
pub mod relay;

#[cfg(test)]
mod testing;

pub use controller::{AttemptId, PairingController, PairingPhase, PairingStatus, ScanOutcome};
pub use handoff::{ChannelHandoff, SessionHandoff};
pub use launcher::{EndpointLease, LaunchedEndpoint, LocalEndpointLauncher};
pub use relay::{ConnectionState, HandshakeOutcome, RelayClient, RelayConnection, RelayEvent};
