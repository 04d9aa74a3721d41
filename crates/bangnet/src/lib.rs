//! # bangnet
//!
//! Non-blocking message transport for networked card games.
//!
//! A game client or lobby server runs a frame loop; bangnet keeps every
//! socket on one background I/O thread and lets the loop push and pop
//! typed messages without ever waiting on the network.
//!
//! - [`protocol`]: the binary codec, frame header and lobby messages.
//! - [`transport`]: connections, the connection server and the reactor.
//! - [`Settings`]: JSON configuration for both ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bangnet::prelude::*;
//!
//! # fn main() -> Result<(), BangnetError> {
//! let reactor = Reactor::start()?;
//! let settings = Settings::default();
//!
//! let client = bangnet::lobby_client(&reactor, &settings);
//! client.connect("localhost:47654");
//! client.push_message(&ClientMessage::LobbyList)?;
//!
//! // Each frame:
//! while let Some(message) = client.pop_message() {
//!     // update the lobby browser
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod settings;

pub use bangnet_protocol as protocol;
pub use bangnet_transport as transport;

pub use error::BangnetError;
pub use settings::Settings;

use bangnet_protocol::{ClientMessage, ServerMessage};
use bangnet_transport::{Connection, ConnectionServer, Reactor, ServerEvent};

/// The client end of a lobby link.
pub type LobbyClient = Connection<ServerMessage, ClientMessage>;

/// A lobby server: receives [`ClientMessage`]s, answers with
/// [`ServerMessage`]s.
pub type LobbyServer = ConnectionServer<ClientMessage, ServerMessage>;

/// What [`LobbyServer::poll_events`] yields.
pub type LobbyServerEvent = ServerEvent<ClientMessage>;

/// A disconnected lobby client using `settings.client`.
pub fn lobby_client(reactor: &Reactor, settings: &Settings) -> LobbyClient {
    Connection::new(reactor.handle(), settings.client.clone())
}

/// Binds a lobby server using `settings.server`.
pub fn lobby_server(reactor: &Reactor, settings: &Settings) -> Result<LobbyServer, BangnetError> {
    Ok(ConnectionServer::bind(reactor.handle(), settings.server.clone())?)
}

/// Everything a game loop needs to talk to a lobby.
pub mod prelude {
    pub use crate::{
        BangnetError, LobbyClient, LobbyServer, LobbyServerEvent, Settings, lobby_client,
        lobby_server,
    };
    pub use bangnet_protocol::{
        ClientMessage, ClientMessageKind, ConnectArgs, GameStartedArgs, LobbyChatArgs,
        LobbyChatClientArgs, LobbyData, LobbyEnteredArgs, LobbyInfo, LobbyJoinArgs, LobbyLeftArgs,
        LobbyPlayerData, LobbyState, ServerMessage, ServerMessageKind, TaggedVariant,
    };
    pub use bangnet_transport::{
        ClientId, CloseReason, ConnectionConfig, ConnectionState, LinkEvent, MessageQueue,
        Reactor, ServerConfig, ServerEvent,
    };
}
