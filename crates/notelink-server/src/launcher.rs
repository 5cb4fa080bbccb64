//! Starts and stops the local endpoint for a pairing attempt

use async_trait::async_trait;
use notelink_core::{LaunchError, LocalEndpointInfo, PairingConfig};
use notelink_pairing::{EndpointLease, LaunchedEndpoint, LocalEndpointLauncher};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::http::{create_router, get_local_ip, EndpointState};

/// How long a stopping server may take to drain connections
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handle to stop a running server
struct ServerHandle {
    lease: EndpointLease,
    endpoint: LocalEndpointInfo,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, self.task).await.is_err() {
            warn!("Local server {} ({}) did not stop in time", self.endpoint, self.lease);
        }
        info!("Local server {} ({}) stopped", self.endpoint, self.lease);
    }
}

/// Launches the axum endpoint; at most one runs at a time
pub struct HttpEndpointLauncher {
    config: PairingConfig,
    running: Mutex<Option<ServerHandle>>,
    next_lease: AtomicU64,
}

impl HttpEndpointLauncher {
    pub fn new(config: PairingConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
            next_lease: AtomicU64::new(1),
        }
    }

    /// Endpoint currently being served, if any
    pub fn current(&self) -> Option<LocalEndpointInfo> {
        self.running
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|h| h.endpoint.clone()))
    }

    /// Stop whatever is running
    pub async fn shutdown(&self) {
        let handle = self.running.lock().ok().and_then(|mut g| g.take());
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    /// Host announced to peers
    fn advertised_host(&self) -> Result<String, LaunchError> {
        if let Some(host) = &self.config.advertise_host {
            return Ok(host.clone());
        }
        if !self.config.bind_address.is_unspecified() {
            return Ok(self.config.bind_address.to_string());
        }
        get_local_ip().ok_or(LaunchError::NoNetwork)
    }
}

#[async_trait]
impl LocalEndpointLauncher for HttpEndpointLauncher {
    async fn start(&self, token: &str) -> Result<LaunchedEndpoint, LaunchError> {
        // A previous attempt's server may still hold the port
        self.shutdown().await;

        let host = self.advertised_host()?;
        let listener = TcpListener::bind(self.config.bind_socket_addr())
            .await
            .map_err(launch_error)?;
        let port = listener.local_addr().map_err(launch_error)?.port();
        let endpoint = LocalEndpointInfo::new(host, port);
        let lease = EndpointLease::new(self.next_lease.fetch_add(1, Ordering::Relaxed));

        let router = create_router(Arc::new(EndpointState::new(token, endpoint.clone())));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
                debug!("Local server shutting down");
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Local server error: {}", e);
            }
        });

        info!(
            "Local server for pairing listening on {} (advertised as {}, {})",
            self.config.bind_socket_addr().ip(),
            endpoint,
            lease
        );

        let previous = self.running.lock().ok().and_then(|mut g| {
            g.replace(ServerHandle {
                lease,
                endpoint: endpoint.clone(),
                shutdown_tx,
                task,
            })
        });
        if let Some(previous) = previous {
            previous.shutdown().await;
        }

        Ok(LaunchedEndpoint {
            info: endpoint,
            lease,
        })
    }

    async fn stop(&self, lease: EndpointLease) {
        let handle = self.running.lock().ok().and_then(|mut g| {
            if g.as_ref().is_some_and(|h| h.lease == lease) {
                g.take()
            } else {
                None
            }
        });
        match handle {
            Some(handle) => handle.shutdown().await,
            None => debug!("Local server for {} already stopped or replaced", lease),
        }
    }
}

fn launch_error(e: io::Error) -> LaunchError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied(e.to_string()),
        _ => LaunchError::Bind(e),
    }
}
