//! NoteLink Server - Axum-based local endpoint for paired browsers
//!
//! This crate provides the HTTP server a phone starts while pairing, and the
//! launcher that plugs it into the pairing controller.

pub mod auth;
pub mod http;
pub mod launcher;

pub use http::{create_router, get_local_ip, EndpointState};
pub use launcher::HttpEndpointLauncher;
