//! Connection and server configuration.

use std::time::Duration;

use bangnet_protocol::{DEFAULT_SERVER_PORT, MAX_FRAME_LENGTH, SERVER_MAX_CLIENTS};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Per-connection settings, shared by both ends.
///
/// Every field has a default, so a partial JSON object deserializes into a
/// complete config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long a frame body may take to arrive once its header was read.
    /// Idle time between frames is not limited.
    pub body_timeout_ms: u64,

    /// Largest accepted frame body, in bytes. Applies to both directions.
    pub max_frame_length: u32,

    /// Disable Nagle's algorithm on TCP sockets.
    pub nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            body_timeout_ms: 5_000,
            max_frame_length: MAX_FRAME_LENGTH,
            nodelay: true,
        }
    }
}

impl ConnectionConfig {
    /// The body timeout as a [`Duration`].
    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Settings for a [`ConnectionServer`](crate::ConnectionServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub bind_addr: String,

    /// Peers beyond this many are refused.
    pub max_clients: usize,

    /// Settings applied to every accepted connection.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_SERVER_PORT}"),
            max_clients: SERVER_MAX_CLIENTS,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Default settings listening on `addr`.
    pub fn with_bind_addr(addr: impl Into<String>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Default::default()
        }
    }
}
