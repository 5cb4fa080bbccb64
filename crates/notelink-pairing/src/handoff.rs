//! Session hand-off collaborator

use notelink_core::LocalEndpointInfo;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

/// Receives the negotiated endpoint once pairing completes
pub trait SessionHandoff: Send + Sync + 'static {
    fn on_paired(&self, endpoint: LocalEndpointInfo);
}

/// Hand-off that forwards the endpoint over a oneshot channel
pub struct ChannelHandoff {
    tx: Mutex<Option<oneshot::Sender<LocalEndpointInfo>>>,
}

impl ChannelHandoff {
    pub fn new() -> (Self, oneshot::Receiver<LocalEndpointInfo>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl SessionHandoff for ChannelHandoff {
    fn on_paired(&self, endpoint: LocalEndpointInfo) {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match tx {
            Some(tx) => {
                if tx.send(endpoint).is_err() {
                    warn!("Hand-off receiver dropped before pairing completed");
                }
            }
            None => warn!("Hand-off already delivered"),
        }
    }
}
