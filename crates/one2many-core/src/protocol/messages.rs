//! JSON message types for the signaling protocol.
//!
//! # Message flow
//!
//! ```text
//! Participant → Server:  JSON text frame  →  ClientMessage
//! Server → Participant:  ServerMessage    →  JSON text frame
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object whose `"id"` field names the variant; all
//! other fields sit in the same object:
//!
//! ```json
//! {"id":"master","sdpOffer":"v=0..."}
//! {"id":"viewerResponse","response":"rejected","message":"No active sender now. ..."}
//! {"id":"stopCommunication"}
//! ```
//!
//! Inbound and outbound messages are separate enums so a server-only message
//! can never be parsed from a participant, and vice versa.

use serde::{Deserialize, Serialize};

use crate::domain::error::BroadcastError;

// ── Participant → Server ──────────────────────────────────────────────────────

/// All messages a participant can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Attempt to become the broadcaster.
    Master {
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },

    /// Attempt to join as a viewer.
    Viewer {
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },

    /// Voluntary teardown of this participant's role.
    Stop,
}

impl ClientMessage {
    /// Variant name for log lines; never includes the SDP body.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Master { .. } => "master",
            ClientMessage::Viewer { .. } => "viewer",
            ClientMessage::Stop => "stop",
        }
    }
}

// ── Server → Participant ──────────────────────────────────────────────────────

/// Outcome carried by `masterResponse` and `viewerResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Accepted,
    Rejected,
}

/// Body of a `masterResponse` / `viewerResponse`.
///
/// Exactly one of `sdp_answer` (accepted) or `message` (rejected) is set; the
/// other is omitted from the JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub response: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RoleResponse {
    pub fn accepted(sdp_answer: impl Into<String>) -> Self {
        Self {
            response: ResponseStatus::Accepted,
            sdp_answer: Some(sdp_answer.into()),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            response: ResponseStatus::Rejected,
            sdp_answer: None,
            message: Some(message.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.response == ResponseStatus::Accepted
    }
}

impl From<Result<String, BroadcastError>> for RoleResponse {
    fn from(result: Result<String, BroadcastError>) -> Self {
        match result {
            Ok(answer) => Self::accepted(answer),
            Err(e) => Self::rejected(e.to_string()),
        }
    }
}

/// All messages the server sends to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Result of a `master` request.
    MasterResponse(RoleResponse),

    /// Result of a `viewer` request.
    ViewerResponse(RoleResponse),

    /// Sent to every viewer when the master stops.
    StopCommunication,

    /// The inbound message was malformed or unrecognised.
    Error { message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::MasterResponse(_) => "masterResponse",
            ServerMessage::ViewerResponse(_) => "viewerResponse",
            ServerMessage::StopCommunication => "stopCommunication",
            ServerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn to_value(msg: &ServerMessage) -> Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn test_master_request_deserializes() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"id":"master","sdpOffer":"offer-1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Master {
                sdp_offer: "offer-1".to_string()
            }
        );
    }

    #[test]
    fn test_viewer_request_deserializes() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"id":"viewer","sdpOffer":"offer-2"}"#).unwrap();
        assert_eq!(msg.kind(), "viewer");
    }

    #[test]
    fn test_stop_request_deserializes() {
        let msg: ClientMessage = serde_json::from_str(r#"{"id":"stop"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Stop);
    }

    #[test]
    fn test_master_request_without_offer_is_rejected() {
        let result: Result<ClientMessage, _> = serde_json::from_str(r#"{"id":"master"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"id":"onIceCandidate","candidate":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_accepted_response_omits_message() {
        let msg = ServerMessage::MasterResponse(RoleResponse::accepted("answer-1"));
        assert_eq!(
            to_value(&msg),
            json!({"id":"masterResponse","response":"accepted","sdpAnswer":"answer-1"})
        );
    }

    #[test]
    fn test_rejected_response_omits_answer() {
        let msg = ServerMessage::ViewerResponse(RoleResponse::rejected("nope"));
        assert_eq!(
            to_value(&msg),
            json!({"id":"viewerResponse","response":"rejected","message":"nope"})
        );
    }

    #[test]
    fn test_stop_communication_has_only_id() {
        assert_eq!(
            to_value(&ServerMessage::StopCommunication),
            json!({"id":"stopCommunication"})
        );
    }

    #[test]
    fn test_error_message_shape() {
        let msg = ServerMessage::Error {
            message: "Invalid message x".to_string(),
        };
        assert_eq!(
            to_value(&msg),
            json!({"id":"error","message":"Invalid message x"})
        );
    }

    #[test]
    fn test_role_response_from_broadcast_error() {
        let response = RoleResponse::from(Err(BroadcastError::AlreadyMaster));
        assert!(!response.is_accepted());
        assert!(response
            .message
            .unwrap()
            .starts_with("Another user is currently acting as sender"));
    }

    #[test]
    fn test_server_message_parses_back() {
        // Browser-side test clients read these messages too.
        let json = r#"{"id":"viewerResponse","response":"accepted","sdpAnswer":"a"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, ServerMessage::ViewerResponse(RoleResponse::accepted("a")));
    }
}
