//! Local endpoint collaborator
//!
//! The controller only needs to start an endpoint authenticated by the
//! pairing token and learn where peers can reach it.

use async_trait::async_trait;
use notelink_core::{LaunchError, LocalEndpointInfo};
use std::fmt;

/// Identifies one started endpoint
///
/// Two attempts may be served on the same `host:port`; the lease tells
/// their servers apart so a late stop only affects its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointLease(u64);

impl EndpointLease {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease {}", self.0)
    }
}

/// A started endpoint and the lease needed to stop it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedEndpoint {
    pub info: LocalEndpointInfo,
    pub lease: EndpointLease,
}

/// Starts the locally reachable, token-authenticated server
#[async_trait]
pub trait LocalEndpointLauncher: Send + Sync + 'static {
    /// Start serving, accepting only requests bearing `token`
    async fn start(&self, token: &str) -> Result<LaunchedEndpoint, LaunchError>;

    /// Release an endpoint whose attempt did not pair
    ///
    /// A lease that no longer names the running endpoint is ignored.
    async fn stop(&self, _lease: EndpointLease) {}
}
