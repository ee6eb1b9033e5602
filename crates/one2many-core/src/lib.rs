//! # one2many-core
//!
//! Shared library for the one-to-many broadcast service: the session registry,
//! the error taxonomy and the JSON signaling protocol.
//!
//! It has no dependencies on sockets, async runtimes or the media server.
//!
//! # Architecture overview
//!
//! One participant (the *master*) streams to any number of *viewers* through
//! an external media pipeline.  This crate holds the parts of that system
//! that are plain data:
//!
//! - **`domain`** – session identifiers, pipeline/endpoint handles, the
//!   [`SessionRegistry`] that tracks master, pipeline and viewers, and the
//!   epoch marker that lets suspended setup chains detect they are stale.
//!
//! - **`protocol`** – the messages exchanged with participants
//!   (`master`, `viewer`, `stop` in; `masterResponse`, `viewerResponse`,
//!   `stopCommunication`, `error` out) and their JSON codec.

pub mod domain;
pub mod protocol;

pub use domain::{
    BroadcastError, BroadcastState, EndpointId, Epoch, PipelineId, SessionId, SessionIdGenerator,
    SessionRegistry,
};
pub use protocol::{decode_client_message, encode_server_message, ClientMessage, ServerMessage};
