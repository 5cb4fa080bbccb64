//! Relay rendezvous client
//!
//! The phone opens a short-lived websocket to the relay, announces its local
//! endpoint with a single `phone-ready` frame, then only listens. The relay
//! forwards the announcement to the browser and closes the channel; a clean
//! close without a prior `error` frame is the success path.
//!
//! Connection lifecycle: `Connecting -> Open -> Closed`, with `Errored`
//! reachable from any state. Once a terminal event has been observed the
//! connection yields nothing further.

use futures::{SinkExt, StreamExt};
use notelink_core::{
    HandshakeError, LocalEndpointInfo, PairingConfig, PairingRequest, RelayMessage, RelayRole,
};
use std::future::Future;
use std::sync::Once;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State of a relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }

    /// State after observing `event`; terminal states absorb everything
    pub fn after(self, event: &RelayEvent) -> ConnectionState {
        if self.is_terminal() {
            return self;
        }
        match event {
            RelayEvent::Message(_) => self,
            RelayEvent::Closed => ConnectionState::Closed,
            RelayEvent::RelayError(_) | RelayEvent::TransportFailed(_) => ConnectionState::Errored,
        }
    }
}

/// Inbound events from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A message with no meaning to the phone role; ignored
    Message(RelayMessage),
    /// The relay reported an error
    RelayError(String),
    /// The relay closed the channel
    Closed,
    /// The connection broke underneath us
    TransportFailed(String),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Message(_))
    }
}

/// How a handshake ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Ready was announced and the relay closed cleanly
    Completed,
    Failed(HandshakeError),
    /// Abandoned by the caller
    Cancelled,
}

/// Client for the rendezvous relay
#[derive(Debug, Clone)]
pub struct RelayClient {
    connect_timeout: Duration,
}

impl RelayClient {
    /// Create a client with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        ensure_crypto_provider();
        Self { connect_timeout }
    }

    pub fn from_config(config: &PairingConfig) -> Self {
        Self::new(config.relay_connect_timeout())
    }

    /// Relay address with the rendezvous query parameters appended
    pub fn target_url(
        relay_address: &str,
        session_id: &str,
        role: RelayRole,
    ) -> Result<Url, HandshakeError> {
        let mut url = Url::parse(relay_address)
            .map_err(|e| HandshakeError::Transport(format!("invalid relay address: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("sessionId", session_id)
            .append_pair("role", role.as_str());
        Ok(url)
    }

    /// Open a connection to the relay
    ///
    /// Resolves once the connection is open, or fails with
    /// [`HandshakeError::Transport`] if it cannot be established within the
    /// connect timeout.
    pub async fn connect(
        &self,
        relay_address: &str,
        session_id: &str,
        role: RelayRole,
    ) -> Result<RelayConnection, HandshakeError> {
        let url = Self::target_url(relay_address, session_id, role)?;
        info!(
            "Connecting to relay {} as {}",
            url.host_str().unwrap_or("<unknown>"),
            role
        );

        let connecting = connect_async(url.as_str());
        let (stream, _response) = match tokio::time::timeout(self.connect_timeout, connecting).await
        {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                warn!("Relay connection failed: {}", e);
                return Err(HandshakeError::Transport(e.to_string()));
            }
            Err(_) => {
                warn!("Relay connection timed out after {:?}", self.connect_timeout);
                return Err(HandshakeError::Transport("connect timed out".to_string()));
            }
        };

        debug!("Relay connection open");
        Ok(RelayConnection {
            stream,
            state: ConnectionState::Open,
            announced: false,
        })
    }

    /// Run the phone side of the rendezvous
    ///
    /// Connects, announces `endpoint` with the request's token, then waits for
    /// the relay's terminal event. `cancelled` resolving abandons the
    /// handshake and closes the connection if it is open.
    pub async fn handshake<C>(
        &self,
        request: &PairingRequest,
        endpoint: &LocalEndpointInfo,
        cancelled: C,
    ) -> HandshakeOutcome
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancelled);

        let mut connection = tokio::select! {
            biased;
            _ = &mut cancelled => return HandshakeOutcome::Cancelled,
            result = self.connect(&request.relay_address, &request.session_id, RelayRole::Phone) => {
                match result {
                    Ok(connection) => connection,
                    Err(e) => return HandshakeOutcome::Failed(e),
                }
            }
        };

        if let Err(e) = connection.announce(endpoint, &request.token).await {
            return HandshakeOutcome::Failed(e);
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut cancelled => {
                    connection.close().await;
                    return HandshakeOutcome::Cancelled;
                }
                event = connection.next_event() => match event {
                    Some(RelayEvent::Message(message)) => {
                        debug!("Ignoring relay message: {:?}", message);
                    }
                    Some(RelayEvent::Closed) | None => {
                        info!("Relay closed the rendezvous");
                        return HandshakeOutcome::Completed;
                    }
                    Some(RelayEvent::RelayError(message)) => {
                        warn!("Relay reported an error: {}", message);
                        return HandshakeOutcome::Failed(HandshakeError::Relay(message));
                    }
                    Some(RelayEvent::TransportFailed(detail)) => {
                        warn!("Relay connection failed: {}", detail);
                        return HandshakeOutcome::Failed(HandshakeError::Transport(detail));
                    }
                }
            }
        }
    }
}

/// An open relay connection in the phone role
pub struct RelayConnection {
    stream: RelayStream,
    state: ConnectionState,
    announced: bool,
}

impl RelayConnection {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Send the `phone-ready` announcement
    ///
    /// This is the only frame the phone ever sends. Returns `Ok(false)`
    /// without sending if it was already sent or the connection is no
    /// longer open.
    pub async fn announce(
        &mut self,
        endpoint: &LocalEndpointInfo,
        token: &str,
    ) -> Result<bool, HandshakeError> {
        if self.announced || self.state != ConnectionState::Open {
            return Ok(false);
        }
        self.announced = true;

        let json = serde_json::to_string(&RelayMessage::phone_ready(endpoint, token))
            .map_err(|e| HandshakeError::Transport(e.to_string()))?;

        debug!("Announcing endpoint {} to relay", endpoint);
        if let Err(e) = self.stream.send(Message::Text(json.into())).await {
            self.state = ConnectionState::Errored;
            return Err(HandshakeError::Transport(e.to_string()));
        }
        Ok(true)
    }

    /// Wait for the next relay event
    ///
    /// Frames that are not JSON relay messages are skipped. Returns `None`
    /// once a terminal event has been delivered.
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        if self.state.is_terminal() {
            return None;
        }

        let event = loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match RelayMessage::decode(text.as_str()) {
                    Some(RelayMessage::Error { error }) => break RelayEvent::RelayError(error),
                    Some(message) => break RelayEvent::Message(message),
                    None => debug!("Skipping untyped relay frame ({} bytes)", text.len()),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!("Relay close frame: {:?}", frame);
                    break RelayEvent::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break RelayEvent::TransportFailed(e.to_string()),
                None => break RelayEvent::Closed,
            }
        };

        self.state = self.state.after(&event);
        Some(event)
    }

    /// Close the connection from our side
    pub async fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Err(e) = self.stream.close(None).await {
            debug!("Relay close failed: {}", e);
        }
        self.state = ConnectionState::Closed;
    }
}

/// Select ring as the process-wide TLS provider for `wss://` relays
fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spawn_relay, RelayScript};
    use notelink_core::RELAY_ERROR_FALLBACK;

    fn endpoint() -> LocalEndpointInfo {
        LocalEndpointInfo::new("192.168.1.5", 8080)
    }

    fn client() -> RelayClient {
        RelayClient::new(Duration::from_secs(5))
    }

    #[test]
    fn test_target_url_appends_rendezvous_params() {
        let url = RelayClient::target_url("wss://relay.example", "s1", RelayRole::Phone).unwrap();
        assert_eq!(url.as_str(), "wss://relay.example/?sessionId=s1&role=phone");
    }

    #[test]
    fn test_target_url_keeps_existing_query() {
        let url =
            RelayClient::target_url("wss://relay.example/rv?region=eu", "a b", RelayRole::Phone)
                .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://relay.example/rv?region=eu&sessionId=a+b&role=phone"
        );
    }

    #[test]
    fn test_target_url_rejects_garbage() {
        assert!(matches!(
            RelayClient::target_url("not a url", "s1", RelayRole::Phone),
            Err(HandshakeError::Transport(_))
        ));
    }

    #[test]
    fn test_terminal_state_absorbs_events() {
        let state = ConnectionState::Open.after(&RelayEvent::RelayError("x".to_string()));
        assert_eq!(state, ConnectionState::Errored);
        assert_eq!(state.after(&RelayEvent::Closed), ConnectionState::Errored);

        let state = ConnectionState::Open.after(&RelayEvent::Message(RelayMessage::Unknown));
        assert_eq!(state, ConnectionState::Open);
        assert_eq!(state.after(&RelayEvent::Closed), ConnectionState::Closed);
        assert_eq!(
            ConnectionState::Closed.after(&RelayEvent::TransportFailed("x".to_string())),
            ConnectionState::Closed
        );
    }

    #[tokio::test]
    async fn test_ready_sent_once_then_clean_close() {
        let relay = spawn_relay(RelayScript::CloseAfterReady).await;
        let mut connection = client()
            .connect(&relay.url, "s1", RelayRole::Phone)
            .await
            .unwrap();
        assert_eq!(connection.state(), ConnectionState::Open);

        assert!(connection.announce(&endpoint(), "t1").await.unwrap());
        assert!(!connection.announce(&endpoint(), "t1").await.unwrap());

        assert_eq!(connection.next_event().await, Some(RelayEvent::Closed));
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.next_event().await, None);

        let observed = relay.observed().await;
        assert!(observed.query.contains("sessionId=s1"));
        assert!(observed.query.contains("role=phone"));
        assert_eq!(observed.frames.len(), 1);
        let ready: serde_json::Value = serde_json::from_str(&observed.frames[0]).unwrap();
        assert_eq!(
            ready,
            serde_json::json!({"type": "phone-ready", "ip": "192.168.1.5", "port": 8080, "token": "t1"})
        );
    }

    #[tokio::test]
    async fn test_events_after_relay_error_are_ignored() {
        let relay = spawn_relay(RelayScript::ErrorAfterReady("session expired")).await;
        let mut connection = client()
            .connect(&relay.url, "s1", RelayRole::Phone)
            .await
            .unwrap();
        connection.announce(&endpoint(), "t1").await.unwrap();

        assert_eq!(
            connection.next_event().await,
            Some(RelayEvent::RelayError("session expired".to_string()))
        );
        assert_eq!(connection.state(), ConnectionState::Errored);
        assert_eq!(connection.next_event().await, None);
    }

    #[tokio::test]
    async fn test_unknown_frames_are_skipped() {
        let relay = spawn_relay(RelayScript::NoiseThenClose).await;
        let mut connection = client()
            .connect(&relay.url, "s1", RelayRole::Phone)
            .await
            .unwrap();
        connection.announce(&endpoint(), "t1").await.unwrap();

        assert_eq!(
            connection.next_event().await,
            Some(RelayEvent::Message(RelayMessage::Unknown))
        );
        assert_eq!(connection.next_event().await, Some(RelayEvent::Closed));
    }

    #[tokio::test]
    async fn test_handshake_outcomes() {
        let request = |url: &str| PairingRequest::new("s1", "t1", url);

        let relay = spawn_relay(RelayScript::CloseAfterReady).await;
        let outcome = client()
            .handshake(&request(&relay.url), &endpoint(), std::future::pending())
            .await;
        assert_eq!(outcome, HandshakeOutcome::Completed);

        let relay = spawn_relay(RelayScript::ErrorAfterReady("session expired")).await;
        let outcome = client()
            .handshake(&request(&relay.url), &endpoint(), std::future::pending())
            .await;
        assert_eq!(
            outcome,
            HandshakeOutcome::Failed(HandshakeError::Relay("session expired".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client()
            .connect(&format!("ws://{}", addr), "s1", RelayRole::Phone)
            .await;
        assert!(matches!(result, Err(HandshakeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_cancel_closes_open_connection() {
        let relay = spawn_relay(RelayScript::HoldOpen).await;
        let request = PairingRequest::new("s1", "t1", relay.url.clone());

        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
        let handshake = tokio::spawn(async move {
            client()
                .handshake(&request, &endpoint(), async {
                    let _ = cancel_rx.await;
                })
                .await
        });

        relay.wait_for_ready().await;
        cancel_tx.send(()).unwrap();

        assert_eq!(handshake.await.unwrap(), HandshakeOutcome::Cancelled);
        assert!(relay.observed().await.client_closed);
    }

    #[tokio::test]
    async fn test_error_frame_without_message_is_terminal() {
        for frame in [
            r#"{"type":"error"}"#,
            r#"{"type":"error","error":null}"#,
            r#"{"type":"error","message":"session expired"}"#,
        ] {
            let relay = spawn_relay(RelayScript::SendAfterReady(frame)).await;
            let outcome = client()
                .handshake(
                    &PairingRequest::new("s1", "t1", relay.url.clone()),
                    &endpoint(),
                    std::future::pending(),
                )
                .await;
            assert_eq!(
                outcome,
                HandshakeOutcome::Failed(HandshakeError::Relay(
                    RELAY_ERROR_FALLBACK.to_string()
                )),
                "frame {}",
                frame
            );
        }
    }

    #[tokio::test]
    async fn test_connection_dropped_after_open_is_transport_failure() {
        let relay = spawn_relay(RelayScript::DropAfterReady).await;
        let mut connection = client()
            .connect(&relay.url, "s1", RelayRole::Phone)
            .await
            .unwrap();
        connection.announce(&endpoint(), "t1").await.unwrap();

        assert!(matches!(
            connection.next_event().await,
            Some(RelayEvent::TransportFailed(_))
        ));
        assert_eq!(connection.state(), ConnectionState::Errored);
        assert_eq!(connection.next_event().await, None);

        let relay = spawn_relay(RelayScript::DropAfterReady).await;
        let outcome = client()
            .handshake(
                &PairingRequest::new("s1", "t1", relay.url.clone()),
                &endpoint(),
                std::future::pending(),
            )
            .await;
        assert!(matches!(
            outcome,
            HandshakeOutcome::Failed(HandshakeError::Transport(_))
        ));
    }
}
