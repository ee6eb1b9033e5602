//! Infrastructure layer for one2many-signaling.
//!
//! Everything that performs I/O lives here.
//!
//! # Responsibilities
//!
//! - Binding the participant-facing WebSocket listener and running one task
//!   per connection (`ws_server`)
//! - Speaking JSON-RPC to a Kurento media server (`kurento`)
//! - The in-process pipeline used for local runs and tests (`memory`)
//! - Reading the optional TOML configuration file (`config_file`)
//!
//! # What does NOT belong here?
//!
//! - Broadcast rules and setup-chain ordering (application layer)
//! - Session and registry types (`one2many-core`)

pub mod config_file;
pub mod kurento;
pub mod memory;
pub mod ws_server;

pub use kurento::KurentoClient;
pub use memory::{InMemoryPipeline, PausedCall, PipelineOp};
pub use ws_server::{run_server, serve};
