use std::time::Duration;

use bangnet_protocol::ProtocolError;

use crate::ClientId;

/// Errors that can occur in the transport layer.
///
/// Every variant that reaches a live link ends it. Nothing here is retried;
/// reconnecting is the caller's decision.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Name resolution failed.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        /// The `host:port` being resolved.
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but produced nothing to connect to.
    #[error("{0} resolved to no addresses")]
    NoAddress(String),

    /// Every resolved endpoint refused or failed the connect.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// The `host:port` being connected to.
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Receiving data failed, including EOF in the middle of a frame.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// A frame body did not arrive within the inactivity timeout.
    #[error("timed out after {0:?} waiting for a message body")]
    Timeout(Duration),

    /// The peer broke the protocol: bad header or undecodable body. Also
    /// returned to callers whose outgoing message cannot be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// There is no link that accepts outgoing messages.
    #[error("not connected")]
    NotConnected,

    /// The server has no client with this id.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// Binding the listening socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// The I/O runtime could not be started.
    #[error("failed to start I/O runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl TransportError {
    /// Whether the error came from the peer's bytes rather than the socket.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}
