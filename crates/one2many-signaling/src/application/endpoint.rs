//! SignalingEndpoint: the per-connection message handler.
//!
//! One endpoint exists per participant connection.  It decodes inbound text
//! frames, hands them to the [`BroadcastCoordinator`] and queues the replies
//! on the connection's outbound channel.
//!
//! `master` and `viewer` requests are admitted inline, so the role exists
//! before the next frame is read.  The pipeline chain that completes the
//! request then runs on its own Tokio task so a slow media server never
//! blocks the connection's read loop; a `stop` or close that arrives
//! mid-setup is processed immediately and the suspended chain sees it at its
//! next checkpoint.

use std::error::Error as _;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use one2many_core::protocol::{invalid_message_reply, ProtocolError, RoleResponse};
use one2many_core::{decode_client_message, ClientMessage, ServerMessage, SessionId};

use super::coordinator::{BroadcastCoordinator, Outbound};

pub struct SignalingEndpoint {
    session_id: SessionId,
    coordinator: Arc<BroadcastCoordinator>,
    outbound: Outbound,
}

impl SignalingEndpoint {
    pub fn new(
        session_id: SessionId,
        coordinator: Arc<BroadcastCoordinator>,
        outbound: Outbound,
    ) -> Self {
        Self {
            session_id,
            coordinator,
            outbound,
        }
    }

    /// Handles one inbound text frame.
    ///
    /// Returns the handle of the spawned setup task for admitted `master` and
    /// `viewer` requests; the task sends the response when it finishes.
    /// Rejected requests are answered before this returns.  Frames that fail
    /// to decode are answered with an `error` message.
    pub async fn handle_text(&self, raw: &str) -> Option<JoinHandle<()>> {
        match decode_client_message(raw) {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => {
                warn!("session {}: {}", self.session_id, decode_failure(&e));
                send(&self.outbound, self.session_id, invalid_message_reply(&e)).await;
                None
            }
        }
    }

    /// Routes a decoded message to the coordinator.
    pub async fn dispatch(&self, msg: ClientMessage) -> Option<JoinHandle<()>> {
        let id = self.session_id;
        debug!("session {id}: received {}", msg.kind());

        match msg {
            ClientMessage::Master { sdp_offer } => {
                let admission = match self.coordinator.admit_master(id).await {
                    Ok(admission) => admission,
                    Err(e) => {
                        let reply = ServerMessage::MasterResponse(RoleResponse::from(Err(e)));
                        send(&self.outbound, id, reply).await;
                        return None;
                    }
                };
                let coordinator = Arc::clone(&self.coordinator);
                let outbound = self.outbound.clone();
                Some(tokio::spawn(async move {
                    let result = coordinator.complete_master(admission, &sdp_offer).await;
                    let reply = ServerMessage::MasterResponse(RoleResponse::from(result));
                    send(&outbound, id, reply).await;
                }))
            }
            ClientMessage::Viewer { sdp_offer } => {
                let admitted = self
                    .coordinator
                    .admit_viewer(id, self.outbound.clone())
                    .await;
                let admission = match admitted {
                    Ok(admission) => admission,
                    Err(e) => {
                        let reply = ServerMessage::ViewerResponse(RoleResponse::from(Err(e)));
                        send(&self.outbound, id, reply).await;
                        return None;
                    }
                };
                let coordinator = Arc::clone(&self.coordinator);
                let outbound = self.outbound.clone();
                Some(tokio::spawn(async move {
                    let result = coordinator.complete_viewer(admission, &sdp_offer).await;
                    let reply = ServerMessage::ViewerResponse(RoleResponse::from(result));
                    send(&outbound, id, reply).await;
                }))
            }
            ClientMessage::Stop => {
                self.coordinator.stop(id).await;
                None
            }
        }
    }

    /// The transport closed or failed; tears down whatever role this
    /// connection held.
    pub async fn handle_close(&self) {
        debug!("session {}: connection closed", self.session_id);
        self.coordinator.stop(self.session_id).await;
    }
}

/// Log text for a frame that failed to decode.
///
/// The frame itself may carry an SDP body, so only the decoder's cause is
/// reported.
fn decode_failure(e: &ProtocolError) -> String {
    match e.source() {
        Some(cause) => format!("undecodable frame: {cause}"),
        None => "undecodable frame".to_string(),
    }
}

async fn send(outbound: &Outbound, id: SessionId, msg: ServerMessage) {
    let kind = msg.kind();
    if outbound.send(msg).await.is_err() {
        debug!("session {id}: connection gone, dropping {kind}");
    }
}
