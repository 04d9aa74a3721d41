//! Unified error type for bangnet.

use std::path::PathBuf;

use bangnet_protocol::ProtocolError;
use bangnet_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors, so an
/// application only ever matches on this one type.
#[derive(Debug, thiserror::Error)]
pub enum BangnetError {
    /// A transport-level error (resolve, connect, send, receive, bind).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, framing).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The settings file could not be read.
    #[error("failed to read settings from {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings were not valid JSON for [`Settings`](crate::Settings).
    #[error("invalid settings: {0}")]
    SettingsFormat(#[from] serde_json::Error),
}
