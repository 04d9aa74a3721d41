//! Link lifecycle: connection state and the events reported to the
//! application.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::TransportError;

/// Where a [`Connection`](crate::Connection) is in its life.
///
/// ```text
/// Disconnected ──connect()──► Resolving ──► Connecting ──► Connected
///       ▲                         │              │             │
///       └──── disconnect() ───────┴──────────────┴─────────────┤
///                                 └──► Error ◄── I/O failure ──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No link, or the link was closed locally or by the peer.
    Disconnected = 0,
    /// The last link ended with an error.
    Error = 1,
    /// Looking up the host name.
    Resolving = 2,
    /// Opening the TCP connection.
    Connecting = 3,
    /// Frames are flowing.
    Connected = 4,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Error,
            2 => Self::Resolving,
            3 => Self::Connecting,
            4 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    /// Whether outgoing messages are accepted. Messages pushed before the
    /// link is up are written once it is.
    pub fn accepts_outbound(self) -> bool {
        matches!(self, Self::Resolving | Self::Connecting | Self::Connected)
    }

    /// Lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Resolving => "resolving",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`ConnectionState`] readable from any thread without locking.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to `next` only while the current state is `from`.
    pub(crate) fn transition(&self, from: ConnectionState, next: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Why a link ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The application called `disconnect()` or dropped its handle.
    Local,
    /// The peer closed the stream on a frame boundary.
    PeerClosed,
    /// An I/O failure, timeout or protocol violation.
    Error(TransportError),
}

impl CloseReason {
    /// Whether the link failed rather than being closed by either end.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::PeerClosed => f.write_str("closed by peer"),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

/// Lifecycle notifications, polled with
/// [`Connection::poll_event`](crate::Connection::poll_event).
///
/// A link reports at most one `Established` and exactly one `Closed`.
#[derive(Debug)]
pub enum LinkEvent {
    /// The link is up and frames can flow.
    Established,
    /// The link ended. No further events follow for it.
    Closed(CloseReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell_round_trips_every_state() {
        let cell = StateCell::new(ConnectionState::Disconnected);
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Error,
            ConnectionState::Resolving,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn test_transition_only_from_expected_state() {
        let cell = StateCell::new(ConnectionState::Connecting);
        assert!(!cell.transition(ConnectionState::Resolving, ConnectionState::Connected));
        assert_eq!(cell.get(), ConnectionState::Connecting);
        assert!(cell.transition(ConnectionState::Connecting, ConnectionState::Connected));
        assert_eq!(cell.get(), ConnectionState::Connected);
    }

    #[test]
    fn test_outbound_accepted_only_while_link_is_live() {
        assert!(!ConnectionState::Disconnected.accepts_outbound());
        assert!(!ConnectionState::Error.accepts_outbound());
        assert!(ConnectionState::Resolving.accepts_outbound());
        assert!(ConnectionState::Connecting.accepts_outbound());
        assert!(ConnectionState::Connected.accepts_outbound());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(CloseReason::PeerClosed.to_string(), "closed by peer");
        let reason = CloseReason::Error(TransportError::NotConnected);
        assert!(reason.is_error());
        assert_eq!(reason.to_string(), "not connected");
    }
}
