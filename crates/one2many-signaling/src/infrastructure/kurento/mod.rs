//! Kurento media server integration.
//!
//! - `rpc` – JSON-RPC 2.0 request and response frames (no I/O)
//! - `client` – the WebSocket connection and the [`PipelineClient`] impl
//!
//! [`PipelineClient`]: crate::application::PipelineClient

pub mod client;
pub mod rpc;

pub use client::KurentoClient;
