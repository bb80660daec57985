//! WebSocket server: accept loop and per-observer sessions.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each connection to a WebSocket session.
//! 3. Registering the session with the [`BroadcastHub`] so it receives every
//!    push, then greeting it with one `snapshot` and one `serial_status`.
//! 4. Executing the observer's JSON requests through the [`RequestService`].
//! 5. Unregistering the session when the socket closes.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Outbound queue
//!
//! Each session owns an unbounded `mpsc` queue of JSON strings drained by a
//! writer task.  Broadcasts and direct replies both go through this queue, so
//! a slow socket never blocks the hub.  A closed queue is reported to the hub
//! as a delivery failure, which drops the observer.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::broadcast_hub::{BroadcastHub, DeliveryError, Observer};
use crate::application::request_service::RequestService;
use crate::domain::messages::{ErrorCode, ObserverRequest, PushMessage};

/// Shared handles every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub hub: Arc<BroadcastHub>,
    pub service: Arc<RequestService>,
}

/// Hub observer backed by a session's outbound queue.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.tx
            .send(text.to_string())
            .map_err(|_| DeliveryError::Closed)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the WebSocket accept loop until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use).
pub async fn run_server(
    bind_addr: SocketAddr,
    context: SessionContext,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {bind_addr}"))?;
    info!("observer WebSocket listening on {}", listener.local_addr().unwrap_or(bind_addr));
    serve(listener, context, running).await;
    Ok(())
}

/// Accepts connections on an already-bound listener until `running` is
/// cleared.
pub async fn serve(listener: TcpListener, context: SessionContext, running: Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop can observe the `running` flag while idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("new observer connection from {peer_addr}");
                let context = context.clone();
                tokio::spawn(async move {
                    handle_observer_session(stream, peer_addr, context).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_observer_session(stream: TcpStream, peer_addr: SocketAddr, context: SessionContext) {
    match run_session(stream, peer_addr, context).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    context: SessionContext,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Register first so no change between greeting and registration is lost.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let observer_id = context
        .hub
        .register(Box::new(ChannelObserver::new(out_tx.clone())));
    info!("session {peer_addr} registered as observer {observer_id}");

    let writer_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!("session {peer_addr}: WebSocket send failed (observer disconnected)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let result = async {
        for greeting in [ObserverRequest::GetSnapshot, ObserverRequest::GetSerialStatus] {
            if let Some(reply) = execute(&context.service, greeting).await? {
                queue(&out_tx, &reply);
            }
        }

        loop {
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                    debug!("session {peer_addr}: observer stream ended");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {peer_addr}: WebSocket error: {e}");
                    break;
                }
            };

            match ws_msg {
                WsMessage::Text(text) => {
                    let reply = match serde_json::from_str::<ObserverRequest>(&text) {
                        Ok(request) => {
                            debug!("session {peer_addr}: {} request", request.type_name());
                            execute(&context.service, request).await?
                        }
                        Err(e) => {
                            warn!("session {peer_addr}: invalid request: {e}");
                            Some(PushMessage::error(ErrorCode::InvalidRequest, e.to_string()))
                        }
                    };
                    if let Some(reply) = reply {
                        queue(&out_tx, &reply);
                    }
                }
                WsMessage::Close(_) => {
                    debug!("session {peer_addr}: Close frame received");
                    break;
                }
                WsMessage::Binary(_) => {
                    warn!("session {peer_addr}: unexpected binary frame (ignored)");
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
        anyhow::Ok(())
    }
    .await;

    context.hub.unregister(observer_id);
    drop(out_tx);
    // The hub held the other sender; with both gone the writer drains and ends.
    let _ = writer_task.await;
    result
}

/// Runs a request on the blocking pool; it may write to the serial port.
async fn execute(
    service: &Arc<RequestService>,
    request: ObserverRequest,
) -> anyhow::Result<Option<PushMessage>> {
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || service.handle(request))
        .await
        .context("request handler panicked")
}

fn queue(out_tx: &mpsc::UnboundedSender<String>, message: &PushMessage) {
    match serde_json::to_string(message) {
        Ok(text) => {
            // A closed queue means the writer is gone; the loop ends on its own.
            let _ = out_tx.send(text);
        }
        Err(e) => error!("failed to serialize {} reply: {e}", message.type_name()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
