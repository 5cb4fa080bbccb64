//! In-process relay used by the tests

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// What the relay does after reading the phone's first frame
#[derive(Debug, Clone, Copy)]
pub(crate) enum RelayScript {
    CloseAfterReady,
    ErrorAfterReady(&'static str),
    NoiseThenClose,
    /// Send this raw text frame, then close
    SendAfterReady(&'static str),
    /// Drop the TCP connection without a close frame
    DropAfterReady,
    HoldOpen,
    CloseOnRelease,
}

/// What one relay connection saw
#[derive(Debug, Clone, Default)]
pub(crate) struct Observed {
    pub query: String,
    pub frames: Vec<String>,
    pub client_closed: bool,
}

pub(crate) struct TestRelay {
    pub url: String,
    connections: Arc<AtomicUsize>,
    ready: Arc<Notify>,
    release: Arc<Notify>,
    observed_rx: Mutex<mpsc::UnboundedReceiver<Observed>>,
}

impl TestRelay {
    /// Number of websocket connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until a phone has sent its first frame
    pub async fn wait_for_ready(&self) {
        self.ready.notified().await;
    }

    /// Let a `CloseOnRelease` connection close
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Wait for the next connection to finish and return what it saw
    pub async fn observed(&self) -> Observed {
        self.observed_rx
            .lock()
            .await
            .recv()
            .await
            .expect("relay task ended")
    }
}

pub(crate) async fn spawn_relay(script: RelayScript) -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/rendezvous", listener.local_addr().unwrap());

    let connections = Arc::new(AtomicUsize::new(0));
    let ready = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (observed_tx, observed_rx) = mpsc::unbounded_channel();

    let relay = TestRelay {
        url,
        connections: connections.clone(),
        ready: ready.clone(),
        release: release.clone(),
        observed_rx: Mutex::new(observed_rx),
    };

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            connections.fetch_add(1, Ordering::SeqCst);
            let ready = ready.clone();
            let release = release.clone();
            let observed_tx = observed_tx.clone();

            tokio::spawn(async move {
                let (query_tx, query_rx) = oneshot::channel();
                let callback = move |request: &Request, response: Response| {
                    let _ = query_tx.send(request.uri().query().unwrap_or_default().to_string());
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };

                let mut observed = Observed {
                    query: query_rx.await.unwrap_or_default(),
                    ..Observed::default()
                };

                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    observed.frames.push(text.as_str().to_string());
                }
                ready.notify_one();

                match script {
                    RelayScript::CloseAfterReady => {
                        let _ = ws.close(None).await;
                    }
                    RelayScript::ErrorAfterReady(error) => {
                        let error = serde_json::json!({"type": "error", "error": error});
                        let _ = ws.send(Message::Text(error.to_string().into())).await;
                        let late = serde_json::json!({"type": "peer-joined"});
                        let _ = ws.send(Message::Text(late.to_string().into())).await;
                        let _ = ws.close(None).await;
                    }
                    RelayScript::NoiseThenClose => {
                        let unknown = serde_json::json!({"type": "peer-joined", "peer": "browser"});
                        let _ = ws.send(Message::Text(unknown.to_string().into())).await;
                        let _ = ws.send(Message::Text("not json".into())).await;
                        let _ = ws.send(Message::Binary(vec![1u8, 2, 3].into())).await;
                        let _ = ws.close(None).await;
                    }
                    RelayScript::SendAfterReady(frame) => {
                        let _ = ws.send(Message::Text(frame.into())).await;
                        let _ = ws.close(None).await;
                    }
                    RelayScript::DropAfterReady => {
                        drop(ws);
                        let _ = observed_tx.send(observed);
                        return;
                    }
                    RelayScript::HoldOpen => {}
                    RelayScript::CloseOnRelease => {
                        release.notified().await;
                        let _ = ws.close(None).await;
                    }
                }

                while let Some(message) = ws.next().await {
                    match message {
                        Ok(Message::Text(text)) => observed.frames.push(text.as_str().to_string()),
                        Ok(Message::Close(_)) => observed.client_closed = true,
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }

                let _ = observed_tx.send(observed);
            });
        }
    });

    relay
}
