//! one2many-signaling library crate.
//!
//! A WebSocket signaling server for a single live broadcast: one participant
//! (the *master*) sends media, any number of *viewers* receive it, and an
//! external media server does the actual routing.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Participants (JSON over WebSocket, path /call)
//!         ↕
//! [one2many-signaling]
//!   ├── domain/           SignalingConfig, MediaServer
//!   ├── application/
//!   │     ├── endpoint/     per-connection message handling
//!   │     ├── coordinator/  master/viewer/stop setup chains
//!   │     └── pipeline/     PipelineClient trait
//!   └── infrastructure/
//!         ├── ws_server/    WebSocket accept loop (tokio-tungstenite)
//!         ├── kurento/      JSON-RPC client for the media server
//!         ├── memory/       in-process pipeline
//!         └── config_file/  optional TOML file
//!         ↕
//! Kurento media server (JSON-RPC over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain`, `one2many-core` and the
//!   `PipelineClient` trait; it never touches a socket.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tokio-tungstenite`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: broadcast coordination.
pub mod application;

/// Infrastructure layer: WebSocket server, media-server clients, config file.
pub mod infrastructure;
