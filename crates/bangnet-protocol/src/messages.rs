//! The lobby protocol: what client and server say to each other.
//!
//! Two kind-sets, one per direction. Game-rule payloads (`GameAction`,
//! `GameUpdate`) are opaque byte buffers here; the game layer owns their
//! contents.

use bytes::Bytes;

/// Port the lobby server listens on unless configured otherwise.
pub const DEFAULT_SERVER_PORT: u16 = 47654;

/// How many clients a server accepts at once.
pub const SERVER_MAX_CLIENTS: usize = 100;

// ---------------------------------------------------------------------------
// Client -> server payloads
// ---------------------------------------------------------------------------

crate::wire_struct! {
    /// First message of a session: who is connecting.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ConnectArgs {
        pub user_name: String,
    }
}

crate::wire_struct! {
    /// Lobby settings chosen by its owner.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct LobbyInfo {
        pub name: String,
        /// Bit set of enabled card expansions.
        pub expansions: u32,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LobbyJoinArgs {
        pub lobby_id: i32,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LobbyChatClientArgs {
        pub message: String,
    }
}

crate::tagged_message! {
    /// Everything a client can send.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ClientMessage {
        kind = ClientMessageKind;
        Connect(ConnectArgs),
        LobbyList,
        LobbyMake(LobbyInfo),
        LobbyEdit(LobbyInfo),
        LobbyJoin(LobbyJoinArgs),
        LobbyPlayers,
        LobbyLeave,
        LobbyChat(LobbyChatClientArgs),
        GameStart,
        /// A move in the running game, encoded by the game layer.
        GameAction(Bytes),
    }
}

// ---------------------------------------------------------------------------
// Server -> client payloads
// ---------------------------------------------------------------------------

crate::wire_enum! {
    /// Where a lobby is in its life.
    pub enum LobbyState: u8 {
        Waiting,
        Playing,
        Finished,
    }
}

crate::wire_struct! {
    /// One row of the lobby browser.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LobbyData {
        pub lobby_id: i32,
        pub name: String,
        pub num_players: i32,
        pub state: LobbyState,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LobbyPlayerData {
        pub user_id: i32,
        pub name: String,
    }
}

crate::wire_struct! {
    /// Sent to a client that just entered a lobby.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LobbyEnteredArgs {
        pub info: LobbyInfo,
        pub user_id: i32,
        pub owner_id: i32,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LobbyLeftArgs {
        pub user_id: i32,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LobbyChatArgs {
        pub user_id: i32,
        pub message: String,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GameStartedArgs {
        pub expansions: u32,
    }
}

crate::tagged_message! {
    /// Everything a server can send.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ServerMessage {
        kind = ServerMessageKind;
        ClientAccepted,
        LobbyList(Vec<LobbyData>),
        LobbyUpdate(LobbyData),
        LobbyEntered(LobbyEnteredArgs),
        LobbyPlayers(Vec<LobbyPlayerData>),
        LobbyEdited(LobbyInfo),
        LobbyJoined(LobbyPlayerData),
        LobbyLeft(LobbyLeftArgs),
        LobbyChat(LobbyChatArgs),
        GameStarted(GameStartedArgs),
        GameError(String),
        /// A state change in the running game, encoded by the game layer.
        GameUpdate(Bytes),
    }
}
