//! Configuration management for Tether
//!
//! This crate provides the configuration model for the Tether server and the machinery to load
//! it from defaults, files (YAML, TOML, JSON) and environment variables.
//!
//! # Features
//!
//! - **Multiple formats**: YAML, TOML and JSON configuration files
//! - **Validation**: out-of-range values are rejected before the server starts
//! - **Environment overrides**: `TETHER__SERVER__PORT=7100` style variables
//! - **Defaults**: every option has a sensible default
//!
//! # Examples
//!
//! ```rust
//! use tether_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .build()
//!     .expect("defaults are valid");
//!
//! assert_eq!(config.server.port, 7000);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for Tether
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listening sockets and command handling
    pub server: ServerConfig,
    /// Transfer engine tuning
    pub transfer: TransferConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Re-run the load-time checks, e.g. after command-line overrides
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigBuilder::validate(self)
    }
}

/// Listening sockets and command handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both the TCP listener and the UDP socket bind to
    pub bind_addr: String,
    /// TCP listening port
    pub port: u16,
    /// UDP port; the TCP port is reused when unset
    pub udp_port: Option<u16>,
    /// Pending-connection queue length of the listener
    pub backlog: i32,
    /// Longest command line read before the line is cut short
    pub max_line_length: usize,
    /// Directory relative transfer paths resolve against
    pub file_root: PathBuf,
    /// Bound on the identity handshake, the UDP rendezvous and the download
    /// acknowledgement; unset waits as long as the client takes
    pub client_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 7000,
            udp_port: None,
            backlog: 5,
            max_line_length: 2048,
            file_root: PathBuf::from("."),
            client_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    /// Socket address of the TCP listener
    pub fn tcp_addr(&self) -> ConfigResult<SocketAddr> {
        self.socket_addr(self.port)
    }

    /// Bound on the short client exchanges around a command, if any
    pub fn client_timeout(&self) -> Option<Duration> {
        self.client_timeout_ms.map(Duration::from_millis)
    }

    /// Socket address of the shared UDP socket
    pub fn udp_addr(&self) -> ConfigResult<SocketAddr> {
        self.socket_addr(self.udp_port.unwrap_or(self.port))
    }

    fn socket_addr(&self, port: u16) -> ConfigResult<SocketAddr> {
        let ip = self.bind_addr.parse().map_err(|e| {
            ConfigError::invalid_value("server.bind_addr".to_string(), format!("{}", e))
        })?;
        Ok(SocketAddr::new(ip, port))
    }
}

/// Transfer engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payload bytes per data frame; kept under an Ethernet frame so UDP chunks do not fragment
    pub chunk_size: usize,
    /// How long to wait for the peer's next frame before retransmitting
    pub io_timeout_ms: u64,
    /// Retransmissions of one frame before the link is considered broken
    pub max_retries: u32,
    /// How long a broken transfer waits for its client to come back
    pub reconnect_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1400,
            io_timeout_ms: 5_000,
            max_retries: 3,
            reconnect_timeout_secs: 30,
        }
    }
}

impl TransferConfig {
    /// Largest payload accepted for a single data frame
    pub const MAX_CHUNK_SIZE: usize = 60_000;

    /// Per-frame read timeout
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Reconnection wait
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
