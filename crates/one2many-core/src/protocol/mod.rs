//! Signaling protocol: JSON message types and the text codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_client_message, encode_server_message, invalid_message_reply, ProtocolError};
pub use messages::{ClientMessage, ResponseStatus, RoleResponse, ServerMessage};
