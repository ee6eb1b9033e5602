//! one2many signaling server entry point.
//!
//! This binary accepts WebSocket connections from participants on the
//! signaling path, lets one of them broadcast and any number of others watch,
//! and drives a Kurento media server (or the in-memory pipeline) to route the
//! media.
//!
//! # Usage
//!
//! ```text
//! one2many-signaling [OPTIONS]
//!
//! Options:
//!   --config          <PATH>  TOML configuration file
//!   --ws-port         <PORT>  WebSocket listener port [default: 8080]
//!   --ws-bind         <ADDR>  WebSocket bind address [default: 0.0.0.0]
//!   --ws-path         <PATH>  Signaling request path [default: /call]
//!   --media-server    <URI>   Kurento URI or "memory" [default: ws://localhost:8888/kurento]
//!   --rpc-timeout     <SECS>  Media-server request timeout [default: 30]
//!   --outbound-buffer <N>     Per-connection outbound queue size [default: 64]
//! ```
//!
//! # Precedence
//!
//! Command-line flag, then environment variable, then the `--config` file,
//! then the built-in default.
//!
//! | Variable                   | Flag                |
//! |----------------------------|---------------------|
//! | `ONE2MANY_CONFIG`          | `--config`          |
//! | `ONE2MANY_WS_PORT`         | `--ws-port`         |
//! | `ONE2MANY_WS_BIND`         | `--ws-bind`         |
//! | `ONE2MANY_WS_PATH`         | `--ws-path`         |
//! | `ONE2MANY_MEDIA_SERVER`    | `--media-server`    |
//! | `ONE2MANY_RPC_TIMEOUT`     | `--rpc-timeout`     |
//! | `ONE2MANY_OUTBOUND_BUFFER` | `--outbound-buffer` |
//!
//! The log filter comes from `RUST_LOG`, falling back to `[logging] level`
//! in the config file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use one2many_signaling::application::{BroadcastCoordinator, PipelineClient};
use one2many_signaling::domain::{MediaServer, SignalingConfig};
use one2many_signaling::infrastructure::config_file::{load_config, FileConfig};
use one2many_signaling::infrastructure::{run_server, InMemoryPipeline, KurentoClient};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// One-to-many broadcast signaling server.
#[derive(Debug, Default, Parser)]
#[command(
    name = "one2many-signaling",
    about = "WebSocket signaling server for one-to-many media broadcasts",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "ONE2MANY_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the WebSocket server to listen on.
    #[arg(long, env = "ONE2MANY_WS_PORT")]
    ws_port: Option<u16>,

    /// IP address to bind the WebSocket server to.
    #[arg(long, env = "ONE2MANY_WS_BIND")]
    ws_bind: Option<String>,

    /// Request path on which WebSocket upgrades are accepted.
    #[arg(long, env = "ONE2MANY_WS_PATH")]
    ws_path: Option<String>,

    /// `ws://` URI of the Kurento media server, or `memory`.
    #[arg(long, env = "ONE2MANY_MEDIA_SERVER")]
    media_server: Option<String>,

    /// Media-server request timeout in seconds.
    #[arg(long, env = "ONE2MANY_RPC_TIMEOUT")]
    rpc_timeout: Option<u64>,

    /// Capacity of each connection's outbound message queue.
    #[arg(long, env = "ONE2MANY_OUTBOUND_BUFFER")]
    outbound_buffer: Option<usize>,
}

impl Cli {
    /// Reads the `--config` file, or returns all-default file settings.
    fn file_config(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }

    /// Merges the CLI arguments over `file` into a [`SignalingConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address or media server is invalid.
    fn into_signaling_config(self, file: FileConfig) -> anyhow::Result<SignalingConfig> {
        let bind = self.ws_bind.unwrap_or(file.server.bind);
        let port = self.ws_port.unwrap_or(file.server.port);
        let ws_bind_addr: SocketAddr = format!("{bind}:{port}")
            .parse()
            .with_context(|| format!("invalid WebSocket bind address: '{bind}:{port}'"))?;

        let media_server: MediaServer = self
            .media_server
            .unwrap_or(file.media_server.uri)
            .parse()?;

        let ws_path = self.ws_path.unwrap_or(file.server.path);
        if !ws_path.starts_with('/') {
            anyhow::bail!("signaling path must start with '/': '{ws_path}'");
        }

        Ok(SignalingConfig {
            ws_bind_addr,
            ws_path,
            media_server,
            rpc_timeout: Duration::from_secs(
                self.rpc_timeout
                    .unwrap_or(file.media_server.request_timeout_secs),
            ),
            outbound_buffer: self.outbound_buffer.unwrap_or(file.server.outbound_buffer),
        })
    }
}

fn pipeline_client(config: &SignalingConfig) -> Arc<dyn PipelineClient> {
    match &config.media_server {
        MediaServer::Kurento(uri) => Arc::new(KurentoClient::new(uri.clone(), config.rpc_timeout)),
        MediaServer::InMemory => Arc::new(InMemoryPipeline::new()),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.file_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&file.logging.level)),
        )
        .init();

    let config = cli.into_signaling_config(file)?;

    info!(
        "one2many signaling server starting: ws={}{}, media server={}",
        config.ws_bind_addr, config.ws_path, config.media_server
    );

    let coordinator = Arc::new(BroadcastCoordinator::new(pipeline_client(&config)));

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, coordinator, running).await?;

    info!("one2many signaling server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use one2many_signaling::infrastructure::config_file::parse_config;

    #[test]
    fn test_defaults_without_flags_or_file() {
        // Arrange
        let cli = Cli::default();

        // Act
        let config = cli.into_signaling_config(FileConfig::default()).unwrap();

        // Assert
        let defaults = SignalingConfig::default();
        assert_eq!(config.ws_bind_addr, defaults.ws_bind_addr);
        assert_eq!(config.ws_path, defaults.ws_path);
        assert_eq!(config.media_server, defaults.media_server);
        assert_eq!(config.rpc_timeout, defaults.rpc_timeout);
        assert_eq!(config.outbound_buffer, defaults.outbound_buffer);
    }

    #[test]
    fn test_cli_flags_parse() {
        let cli = Cli::parse_from([
            "one2many-signaling",
            "--ws-port",
            "9443",
            "--media-server",
            "memory",
            "--rpc-timeout",
            "5",
        ]);
        assert_eq!(cli.ws_port, Some(9443));
        assert_eq!(cli.media_server.as_deref(), Some("memory"));
        assert_eq!(cli.rpc_timeout, Some(5));
    }

    #[test]
    fn test_file_values_apply_when_no_flag() {
        // Arrange
        let file = parse_config(
            "[server]\nport = 9000\npath = \"/live\"\n[media_server]\nuri = \"memory\"\n",
        )
        .unwrap();

        // Act
        let config = Cli::default().into_signaling_config(file).unwrap();

        // Assert
        assert_eq!(config.ws_bind_addr.port(), 9000);
        assert_eq!(config.ws_path, "/live");
        assert_eq!(config.media_server, MediaServer::InMemory);
    }

    #[test]
    fn test_flag_overrides_file() {
        // Arrange
        let file =
            parse_config("[server]\nport = 9000\n[media_server]\nuri = \"memory\"\n").unwrap();
        let cli = Cli {
            ws_port: Some(7000),
            media_server: Some("ws://10.1.1.1:8888/kurento".to_string()),
            ..Cli::default()
        };

        // Act
        let config = cli.into_signaling_config(file).unwrap();

        // Assert
        assert_eq!(config.ws_bind_addr.port(), 7000);
        assert_eq!(
            config.media_server,
            MediaServer::Kurento("ws://10.1.1.1:8888/kurento".to_string())
        );
    }

    #[test]
    fn test_invalid_bind_address_returns_error() {
        let cli = Cli {
            ws_bind: Some("not.an.ip".to_string()),
            ..Cli::default()
        };
        assert!(cli.into_signaling_config(FileConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_media_server_returns_error() {
        let cli = Cli {
            media_server: Some("localhost:8888".to_string()),
            ..Cli::default()
        };
        let err = cli
            .into_signaling_config(FileConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("localhost:8888"));
    }

    #[test]
    fn test_relative_path_returns_error() {
        let cli = Cli {
            ws_path: Some("call".to_string()),
            ..Cli::default()
        };
        assert!(cli.into_signaling_config(FileConfig::default()).is_err());
    }

    #[test]
    fn test_memory_media_server_builds_client() {
        let config = SignalingConfig {
            media_server: MediaServer::InMemory,
            ..SignalingConfig::default()
        };
        // Constructing a client performs no I/O.
        let _client = pipeline_client(&config);
    }
}
