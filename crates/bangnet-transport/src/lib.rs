//! Transport layer for bangnet.
//!
//! Moves typed messages over framed TCP links without ever blocking the
//! caller:
//!
//! - [`Reactor`] runs every socket on one dedicated I/O thread.
//! - [`Connection`] is one end of a link: `connect`, `push_message`,
//!   `pop_message`, `poll_event`.
//! - [`ConnectionServer`] accepts peers and reports [`ServerEvent`]s.
//! - [`MessageQueue`] is the FIFO both sides poll.
//!
//! # Example
//!
//! ```rust,ignore
//! let reactor = Reactor::start()?;
//! let client: Connection<ServerMessage, ClientMessage> =
//!     Connection::new(reactor.handle(), ConnectionConfig::default());
//! client.connect("localhost:47654");
//!
//! // once per frame:
//! while let Some(event) = client.poll_event() { /* ... */ }
//! while let Some(message) = client.pop_message() { /* ... */ }
//! ```

mod config;
mod connection;
mod error;
mod queue;
mod reactor;
mod server;
mod state;

pub use config::{ConnectionConfig, ServerConfig};
pub use connection::Connection;
pub use error::TransportError;
pub use queue::MessageQueue;
pub use reactor::{REACTOR_THREAD_NAME, Reactor};
pub use server::{ConnectionServer, ServerEvent};
pub use state::{CloseReason, ConnectionState, LinkEvent};

use std::fmt;

/// Identifies one accepted peer for the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Creates a new `ClientId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}
