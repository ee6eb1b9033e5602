//! Domain entities for one-to-many broadcasting.
//!
//! Everything here is pure state and pure data: no sockets, no async runtime,
//! no media-server calls.  The signaling service wraps these types with the
//! asynchronous orchestration; keeping them free of I/O lets every state
//! transition be tested directly.

pub mod error;
pub mod handle;
pub mod registry;
pub mod session;

pub use error::BroadcastError;
pub use handle::{EndpointId, PipelineId};
pub use registry::{
    BroadcastState, Epoch, EvictedViewer, MasterInfo, MasterTeardown, SessionRegistry,
    ViewerState, ViewerTicket,
};
pub use session::{SessionId, SessionIdGenerator};
