//! Optional TOML configuration file.
//!
//! Passed with `--config <path>` (or `ONE2MANY_CONFIG`).  Every field is
//! optional; anything missing falls back to the built-in default, and any
//! command-line flag or environment variable overrides the file.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//! path = "/call"
//! outbound_buffer = 64
//!
//! [media_server]
//! uri = "ws://localhost:8888/kurento"
//! request_timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::SignalingConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub media_server: MediaServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request path on which WebSocket upgrades are accepted.
    #[serde(default = "default_path")]
    pub path: String,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaServerSection {
    /// `ws://…` URI of a Kurento media server, or `"memory"`.
    #[serde(default = "default_media_uri")]
    pub uri: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind() -> String {
    SignalingConfig::default().ws_bind_addr.ip().to_string()
}
fn default_port() -> u16 {
    SignalingConfig::default().ws_bind_addr.port()
}
fn default_path() -> String {
    SignalingConfig::default().ws_path
}
fn default_outbound_buffer() -> usize {
    SignalingConfig::default().outbound_buffer
}
fn default_media_uri() -> String {
    SignalingConfig::default().media_server.to_string()
}
fn default_request_timeout_secs() -> u64 {
    SignalingConfig::default().rpc_timeout.as_secs()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            path: default_path(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for MediaServerSection {
    fn default() -> Self {
        Self {
            uri: default_media_uri(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Load ──────────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// [`ConfigError::Parse`] if the text is not valid TOML for this schema.
pub fn parse_config(text: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Reads and parses the configuration file at `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// its content is invalid.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}
