//! Signaling service configuration types.
//!
//! [`SignalingConfig`] is the single source of truth for runtime settings.
//! `main.rs` builds it from CLI flags, environment variables and an optional
//! TOML file; tests build it directly or start from [`Default`].

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Literal that selects the in-memory pipeline instead of a media server.
pub const IN_MEMORY_MEDIA_SERVER: &str = "memory";

/// Where pipeline operations are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaServer {
    /// A Kurento-compatible media server reachable over WebSocket JSON-RPC.
    Kurento(String),
    /// Local in-process pipeline without real media; for protocol testing.
    InMemory,
}

/// The media-server setting could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid media server '{0}': expected a ws:// or wss:// URI, or '{IN_MEMORY_MEDIA_SERVER}'")]
pub struct InvalidMediaServer(pub String);

impl FromStr for MediaServer {
    type Err = InvalidMediaServer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == IN_MEMORY_MEDIA_SERVER {
            Ok(MediaServer::InMemory)
        } else if s.starts_with("ws://") || s.starts_with("wss://") {
            Ok(MediaServer::Kurento(s.to_string()))
        } else {
            Err(InvalidMediaServer(s.to_string()))
        }
    }
}

impl fmt::Display for MediaServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaServer::Kurento(uri) => f.write_str(uri),
            MediaServer::InMemory => f.write_str(IN_MEMORY_MEDIA_SERVER),
        }
    }
}

/// All runtime configuration for the signaling service.
///
/// # Example
///
/// ```rust
/// use one2many_signaling::domain::SignalingConfig;
///
/// let cfg = SignalingConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8080);
/// assert_eq!(cfg.ws_path, "/call");
/// ```
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Address the WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Request path on which WebSocket upgrades are accepted.
    pub ws_path: String,

    /// Media server used for pipeline operations.
    pub media_server: MediaServer,

    /// Upper bound for a single media-server request.
    ///
    /// This bounds each JSON-RPC round trip, not a whole setup chain.
    pub rpc_timeout: Duration,

    /// Capacity of each connection's outbound message queue.
    pub outbound_buffer: usize,
}

impl Default for SignalingConfig {
    /// | Field           | Default                        |
    /// |-----------------|--------------------------------|
    /// | ws_bind_addr    | `0.0.0.0:8080`                 |
    /// | ws_path         | `/call`                        |
    /// | media_server    | `ws://localhost:8888/kurento`  |
    /// | rpc_timeout     | 30 seconds                     |
    /// | outbound_buffer | 64                             |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/call".to_string(),
            media_server: MediaServer::Kurento("ws://localhost:8888/kurento".to_string()),
            rpc_timeout: Duration::from_secs(30),
            outbound_buffer: 64,
        }
    }
}
