//! Pairing session controller
//!
//! Drives one pairing attempt at a time through
//! `Idle -> Validating -> LaunchingEndpoint -> Handshaking -> Connected`.
//! Any failure returns to `Idle` with a single error message so the next scan
//! is accepted. Scans arriving while an attempt is in flight are dropped:
//! scanners report the same code several times in quick succession.
//!
//! Every asynchronous continuation carries the [`AttemptId`] it was started
//! for and only acts if that attempt is still current and in the phase it
//! expects, so a cancelled or superseded attempt can never touch the state of
//! a newer one.

use crate::handoff::SessionHandoff;
use crate::launcher::{LaunchedEndpoint, LocalEndpointLauncher};
use crate::payload;
use crate::relay::{HandshakeOutcome, RelayClient};
use notelink_core::{LocalEndpointInfo, PairingError, PairingRequest, ValidationError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Identity of one pairing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Phase of the current attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PairingPhase {
    #[default]
    Idle,
    Validating,
    LaunchingEndpoint,
    Handshaking,
    Connected,
}

impl PairingPhase {
    /// An attempt is running and new scans are dropped
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PairingPhase::Validating | PairingPhase::LaunchingEndpoint | PairingPhase::Handshaking
        )
    }
}

/// Snapshot for the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingStatus {
    pub phase: PairingPhase,
    /// Message for the most recent failure, until superseded or dismissed
    pub error: Option<String>,
    pub attempt: Option<AttemptId>,
    /// Endpoint of the current attempt once it is known
    pub endpoint: Option<LocalEndpointInfo>,
}

/// What happened to a scan event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A new attempt was started
    Started(AttemptId),
    /// An attempt is already in flight, or pairing already completed
    Ignored,
    /// The payload was not a usable pairing code
    Rejected(ValidationError),
}

/// The single live attempt record
#[derive(Default)]
struct PairingAttempt {
    id: Option<AttemptId>,
    phase: PairingPhase,
    request: Option<PairingRequest>,
    endpoint: Option<LocalEndpointInfo>,
    last_error: Option<String>,
    cancel: Option<oneshot::Sender<()>>,
    issued: u64,
}

impl PairingAttempt {
    fn status(&self) -> PairingStatus {
        PairingStatus {
            phase: self.phase,
            error: self.last_error.clone(),
            attempt: self.id,
            endpoint: self.endpoint.clone(),
        }
    }

    fn begin(&mut self) -> AttemptId {
        self.issued += 1;
        let id = AttemptId(self.issued);
        self.id = Some(id);
        self.phase = PairingPhase::Validating;
        self.request = None;
        self.endpoint = None;
        self.last_error = None;
        self.cancel = None;
        id
    }

    /// Back to Idle, dropping everything the attempt held
    fn reset(&mut self, error: Option<String>) {
        self.phase = PairingPhase::Idle;
        self.request = None;
        self.endpoint = None;
        self.last_error = error;
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    fn is_current(&self, id: AttemptId, phase: PairingPhase) -> bool {
        self.id == Some(id) && self.phase == phase
    }
}

struct Shared {
    attempt: Mutex<PairingAttempt>,
    status_tx: watch::Sender<PairingStatus>,
    launcher: Arc<dyn LocalEndpointLauncher>,
    handoff: Arc<dyn SessionHandoff>,
    relay: RelayClient,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PairingAttempt> {
        self.attempt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, attempt: &PairingAttempt) {
        self.status_tx.send_replace(attempt.status());
    }

    /// Apply `f` if `id` is still current and in `from`
    fn advance(
        &self,
        id: AttemptId,
        from: PairingPhase,
        f: impl FnOnce(&mut PairingAttempt),
    ) -> bool {
        let mut attempt = self.lock();
        if !attempt.is_current(id, from) {
            debug!("Attempt {} no longer in {:?}; dropping continuation", id, from);
            return false;
        }
        f(&mut attempt);
        self.publish(&attempt);
        true
    }

    fn fail(&self, id: AttemptId, from: PairingPhase, error: impl Into<PairingError>) -> bool {
        let error = error.into();
        self.advance(id, from, |attempt| {
            warn!("Pairing attempt {} failed: {:?}", id, error);
            attempt.reset(Some(error.to_string()));
        })
    }
}

/// Orchestrates validation, endpoint launch, relay handshake and hand-off
///
/// Must be used from within a tokio runtime. Dropping the controller abandons
/// any in-flight attempt.
pub struct PairingController {
    shared: Arc<Shared>,
}

impl PairingController {
    pub fn new(
        launcher: Arc<dyn LocalEndpointLauncher>,
        handoff: Arc<dyn SessionHandoff>,
        relay: RelayClient,
    ) -> Self {
        let (status_tx, _) = watch::channel(PairingStatus::default());
        Self {
            shared: Arc::new(Shared {
                attempt: Mutex::new(PairingAttempt::default()),
                status_tx,
                launcher,
                handoff,
                relay,
            }),
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> PairingStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Follow status changes
    pub fn subscribe(&self) -> watch::Receiver<PairingStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Handle a scan event
    ///
    /// Ignored unless the controller is Idle. Validation happens inline; a
    /// valid request starts the launch and handshake in the background.
    pub fn on_scan(&self, raw: &str) -> ScanOutcome {
        let mut attempt = self.shared.lock();
        if attempt.phase != PairingPhase::Idle {
            debug!("Scan ignored while {:?}", attempt.phase);
            return ScanOutcome::Ignored;
        }

        let id = attempt.begin();
        self.shared.publish(&attempt);

        let request = match payload::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                warn!("Pairing attempt {} rejected: {}", id, e);
                attempt.reset(Some(e.to_string()));
                self.shared.publish(&attempt);
                return ScanOutcome::Rejected(e);
            }
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        attempt.phase = PairingPhase::LaunchingEndpoint;
        attempt.request = Some(request.clone());
        attempt.cancel = Some(cancel_tx);
        self.shared.publish(&attempt);
        drop(attempt);

        info!(
            "Pairing attempt {} started for session {}",
            id, request.session_id
        );
        tokio::spawn(run_attempt(self.shared.clone(), id, request, cancel_rx));
        ScanOutcome::Started(id)
    }

    /// Clear the error message while Idle
    pub fn dismiss_error(&self) {
        let mut attempt = self.shared.lock();
        if attempt.phase == PairingPhase::Idle && attempt.last_error.is_some() {
            attempt.last_error = None;
            self.shared.publish(&attempt);
        }
    }

    /// Abandon the in-flight attempt, if any
    ///
    /// The relay connection is closed and the endpoint released in the
    /// background; hand-off will not happen. Returns whether anything was
    /// abandoned.
    pub fn cancel(&self) -> bool {
        let mut attempt = self.shared.lock();
        if !attempt.phase.is_in_flight() {
            return false;
        }
        if let Some(id) = attempt.id {
            info!("Pairing attempt {} cancelled", id);
        }
        attempt.reset(None);
        self.shared.publish(&attempt);
        true
    }
}

impl Drop for PairingController {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_attempt(
    shared: Arc<Shared>,
    id: AttemptId,
    request: PairingRequest,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let launched = tokio::select! {
        biased;
        _ = &mut cancel_rx => {
            debug!("Attempt {} abandoned during endpoint launch", id);
            return;
        }
        result = shared.launcher.start(&request.token) => result,
    };

    let LaunchedEndpoint { info: endpoint, lease } = match launched {
        Ok(launched) => launched,
        Err(e) => {
            shared.fail(id, PairingPhase::LaunchingEndpoint, e);
            return;
        }
    };

    let handshaking = shared.advance(id, PairingPhase::LaunchingEndpoint, |attempt| {
        attempt.phase = PairingPhase::Handshaking;
        attempt.endpoint = Some(endpoint.clone());
    });
    if !handshaking {
        shared.launcher.stop(lease).await;
        return;
    }
    info!("Attempt {}: local endpoint at {} ({}), contacting relay", id, endpoint, lease);

    let cancelled = async move {
        let _ = cancel_rx.await;
    };
    match shared.relay.handshake(&request, &endpoint, cancelled).await {
        HandshakeOutcome::Completed => {
            let connected = shared.advance(id, PairingPhase::Handshaking, |attempt| {
                attempt.phase = PairingPhase::Connected;
                attempt.request = None;
                attempt.cancel = None;
            });
            if connected {
                info!("Attempt {} paired; handing off {}", id, endpoint);
                shared.handoff.on_paired(endpoint);
            } else {
                shared.launcher.stop(lease).await;
            }
        }
        HandshakeOutcome::Failed(e) => {
            shared.launcher.stop(lease).await;
            shared.fail(id, PairingPhase::Handshaking, e);
        }
        HandshakeOutcome::Cancelled => {
            debug!("Attempt {} abandoned during handshake", id);
            shared.launcher.stop(lease).await;
        }
    }
}
