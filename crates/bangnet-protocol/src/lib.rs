//! Wire protocol for bangnet.
//!
//! This crate defines the "language" that card-game clients and servers
//! speak:
//!
//! - **Codec** ([`Encode`], [`Decode`], [`Reader`]): the big-endian,
//!   length-prefixed binary format.
//! - **Schemas** ([`wire_struct!`], [`wire_enum!`], [`tagged_message!`]):
//!   declaring message types and getting their codec for free.
//! - **Frames** ([`FrameHeader`], [`encode_frame`]): the magic + length
//!   preamble that splits a byte stream into messages.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): the lobby
//!   vocabulary.
//! - **Errors** ([`ProtocolError`] and its parts).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets. The transport reads a
//! frame, hands the body to [`decode_exact`], and gets a typed message back:
//!
//! ```text
//! Transport (frames) → Protocol (typed messages) → Lobby / game logic
//! ```

mod codec;
mod error;
mod frame;
mod macros;
mod messages;

#[doc(hidden)]
pub use bytes;

pub use codec::{
    Decode, Encode, MAX_SHORT_LEN, Reader, Schema, ShortSize, TaggedVariant,
    decode_exact, encode_len, encode_to_bytes,
};
pub use error::{DecodeError, EncodeError, FrameError, ProtocolError};
pub use frame::{FrameHeader, MAGIC, MAX_FRAME_LENGTH, encode_frame};
pub use messages::{
    ClientMessage, ClientMessageKind, ConnectArgs, DEFAULT_SERVER_PORT,
    GameStartedArgs, LobbyChatArgs, LobbyChatClientArgs, LobbyData,
    LobbyEnteredArgs, LobbyInfo, LobbyJoinArgs, LobbyLeftArgs,
    LobbyPlayerData, LobbyState, SERVER_MAX_CLIENTS, ServerMessage,
    ServerMessageKind,
};
