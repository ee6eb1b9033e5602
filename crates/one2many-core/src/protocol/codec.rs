//! Text codec for the signaling protocol.
//!
//! Frames are UTF-8 JSON objects, one message per WebSocket text frame.  The
//! codec is a thin layer over `serde_json` that gives the rest of the system
//! one error type and keeps the "invalid message" wording in one place.

use thiserror::Error;

use super::messages::{ClientMessage, ServerMessage};

/// Errors produced while decoding or encoding signaling frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any known message.
    #[error("Invalid message {raw}")]
    InvalidMessage {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// An outbound message could not be serialized.
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes one inbound text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidMessage`] when the frame is not JSON, has
/// no `"id"`, names an unknown message, or lacks a required field.  Its
/// `Display` text is what the participant receives in an `error` message.
///
/// # Examples
///
/// ```rust
/// use one2many_core::protocol::{decode_client_message, ClientMessage};
///
/// let msg = decode_client_message(r#"{"id":"stop"}"#).unwrap();
/// assert_eq!(msg, ClientMessage::Stop);
/// ```
pub fn decode_client_message(raw: &str) -> Result<ClientMessage, ProtocolError> {
    serde_json::from_str(raw).map_err(|source| ProtocolError::InvalidMessage {
        raw: raw.to_string(),
        source,
    })
}

/// Encodes one outbound message as a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|source| ProtocolError::Encode {
        kind: msg.kind(),
        source,
    })
}

/// Builds the `error` reply for a frame that failed to decode.
pub fn invalid_message_reply(err: &ProtocolError) -> ServerMessage {
    ServerMessage::Error {
        message: err.to_string(),
    }
}
