//! Domain layer for one2many-signaling.
//!
//! Plain configuration types with no I/O.  Reading files and the environment
//! happens in `main.rs` and the infrastructure layer.

pub mod config;

pub use config::{InvalidMediaServer, MediaServer, SignalingConfig, IN_MEMORY_MEDIA_SERVER};
