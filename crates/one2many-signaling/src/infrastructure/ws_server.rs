//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from participants.
//! 3. Upgrading each connection to WebSocket, but only on the configured
//!    request path; every other path gets `404 Not Found`.
//! 4. Assigning each connection a fresh [`SessionId`].
//! 5. Running a writer task that drains the connection's outbound queue into
//!    the socket, while the connection task reads frames and hands them to a
//!    [`SignalingEndpoint`].
//! 6. Gracefully shutting down when the `running` flag is cleared.
//!
//! # Outbound queue
//!
//! Replies and `stopCommunication` notifications never write to the socket
//! directly.  They are queued on a bounded `mpsc` channel whose only consumer
//! is the writer task, so the coordinator never waits on a slow socket.

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
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use one2many_core::{encode_server_message, ServerMessage, SessionId, SessionIdGenerator};

use crate::application::{BroadcastCoordinator, SignalingEndpoint};
use crate::domain::config::SignalingConfig;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.ws_bind_addr` and serves participants until `running` is
/// set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: SignalingConfig,
    coordinator: Arc<BroadcastCoordinator>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket listener on {}",
                config.ws_bind_addr
            )
        })?;

    serve(listener, config, coordinator, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// When the loop exits the coordinator is shut down, which notifies any
/// remaining viewers and releases every pipeline handle.
pub async fn serve(
    listener: TcpListener,
    config: SignalingConfig,
    coordinator: Arc<BroadcastCoordinator>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!("signaling server listening on ws://{local}{}", config.ws_path);

    let config = Arc::new(config);
    let ids = SessionIdGenerator::new();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let session_id = ids.next();
                debug!("session {session_id}: tcp connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, session_id, cfg, coordinator).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep serving the others.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    session_id: SessionId,
    config: Arc<SignalingConfig>,
    coordinator: Arc<BroadcastCoordinator>,
) {
    match run_connection(stream, session_id, config, coordinator).await {
        Ok(()) => info!("session {session_id}: closed ({peer_addr})"),
        Err(e) => warn!("session {session_id}: closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one participant connection.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails, including when the
/// request path is not the signaling path.
async fn run_connection(
    stream: TcpStream,
    session_id: SessionId,
    config: Arc<SignalingConfig>,
    coordinator: Arc<BroadcastCoordinator>,
) -> anyhow::Result<()> {
    let path = config.ws_path.clone();
    let ws_stream = accept_hdr_async(stream, move |req: &Request, resp: Response| {
        if req.uri().path() == path {
            Ok(resp)
        } else {
            Err(not_found())
        }
    })
    .await
    .with_context(|| format!("WebSocket handshake failed for session {session_id}"))?;

    info!("session {session_id}: connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer.max(1));

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match encode_server_message(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!("session {session_id}: {e}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!("session {session_id}: socket gone, writer stopping");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let endpoint = SignalingEndpoint::new(session_id, coordinator, out_tx);

    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("session {session_id}: WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!("session {session_id}: WebSocket error: {e}");
                break;
            }
            None => break,
        };

        match frame {
            WsMessage::Text(text) => {
                endpoint.handle_text(&text).await;
            }
            WsMessage::Binary(_) => {
                warn!("session {session_id}: unexpected binary frame (ignored)");
            }
            WsMessage::Close(_) => {
                debug!("session {session_id}: Close frame received");
                break;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }

    endpoint.handle_close().await;
    writer.abort();
    Ok(())
}

/// Handshake rejection for any path other than the signaling path.
fn not_found() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("Not Found".to_string()));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

// ── Tests ─────────────────────────────────────────────────────────────────────
