//! Configuration types for NoteLink pairing

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Main configuration for a pairing session and its local endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Interface the local endpoint binds to
    pub bind_address: IpAddr,
    /// Local endpoint port (0 picks an ephemeral port)
    pub port: u16,
    /// Host announced to the relay (auto-detected if None)
    pub advertise_host: Option<String>,
    /// Connect timeout for the relay websocket, in seconds
    pub relay_connect_timeout_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            advertise_host: None,
            relay_connect_timeout_secs: 10,
        }
    }
}

impl PairingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set bind address
    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set advertised host
    pub fn with_advertise_host(mut self, host: Option<String>) -> Self {
        self.advertise_host = host;
        self
    }

    /// Builder pattern: set relay connect timeout
    pub fn with_relay_connect_timeout(mut self, timeout: Duration) -> Self {
        self.relay_connect_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn relay_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_connect_timeout_secs)
    }

    /// Socket address the local endpoint binds to
    pub fn bind_socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind_address, self.port)
    }
}
