//! Application layer for one2many-signaling.
//!
//! The application layer decides *what* happens when a participant asks to
//! broadcast, watch or stop.  It talks to the media server only through the
//! [`PipelineClient`] trait and to participants only through an outbound
//! message queue.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or performing the WebSocket handshake (infrastructure)
//! - The JSON-RPC wire format of the media server (infrastructure)
//! - Reading configuration (done in `main.rs`)

pub mod coordinator;
pub mod endpoint;
pub mod pipeline;

pub use coordinator::{BroadcastCoordinator, MasterAdmission, Outbound, ViewerAdmission};
pub use endpoint::SignalingEndpoint;
pub use pipeline::{PipelineClient, PipelineError};
