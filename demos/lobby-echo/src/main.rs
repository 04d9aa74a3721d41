//! A lobby server and a client in one process, both polled from a 60 Hz
//! frame loop the way a game would drive them.
//!
//! ```text
//! RUST_LOG=debug cargo run -p lobby-echo -- [settings.json]
//! ```

use std::time::{Duration, Instant};

use bangnet::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const FRAME: Duration = Duration::from_millis(16);
const MAX_FRAMES: u32 = 600;
const CHAT_LOG_LINES: usize = 4;

const LINES: &[&str] = &[
    "Howdy, partner.",
    "Who brought the Volcanic?",
    "Bang!",
    "Missed!",
    "Beer for everyone.",
    "I'm the Sheriff, trust me.",
];

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Accepts everyone and echoes chat back to the whole room.
fn run_server_frame(server: &LobbyServer) {
    for event in server.poll_events() {
        match event {
            ServerEvent::Connected { id, addr } => {
                tracing::info!(%id, %addr, "player arrived");
            }
            ServerEvent::Message { id, message } => {
                tracing::debug!(%id, kind = message.kind_name(), "message from player");
                match message {
                    ClientMessage::Connect(args) => {
                        tracing::info!(%id, user_name = %args.user_name, "player introduced");
                        if let Err(e) = server.push_message(id, &ServerMessage::ClientAccepted) {
                            tracing::warn!(%id, error = %e, "failed to accept player");
                        }
                    }
                    ClientMessage::LobbyChat(chat) => {
                        let echo = ServerMessage::LobbyChat(LobbyChatArgs {
                            user_id: i32::try_from(id.into_inner()).unwrap_or(i32::MAX),
                            message: chat.message,
                        });
                        server.broadcast(&echo);
                    }
                    other => {
                        let reply = ServerMessage::GameError(format!(
                            "{} is not supported here",
                            other.kind_name()
                        ));
                        if let Err(e) = server.push_message(id, &reply) {
                            tracing::warn!(%id, error = %e, "failed to reply");
                        }
                    }
                }
            }
            ServerEvent::Disconnected { id, reason } => {
                tracing::info!(%id, %reason, "player left");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

struct Player {
    link: LobbyClient,
    chat_log: MessageQueue<String>,
    echoes: usize,
}

impl Player {
    /// Returns `false` once the link is gone.
    fn run_frame(&mut self) -> Result<bool, BangnetError> {
        while let Some(event) = self.link.poll_event() {
            match event {
                LinkEvent::Established => {
                    self.link.push_message(&ClientMessage::Connect(ConnectArgs {
                        user_name: "Bart Cassidy".into(),
                    }))?;
                    for line in LINES {
                        self.link
                            .push_message(&ClientMessage::LobbyChat(LobbyChatClientArgs {
                                message: (*line).to_string(),
                            }))?;
                    }
                }
                LinkEvent::Closed(reason) => {
                    tracing::info!(%reason, "client link closed");
                    return Ok(false);
                }
            }
        }

        while let Some(message) = self.link.pop_message() {
            match message {
                ServerMessage::ClientAccepted => tracing::info!("accepted by server"),
                ServerMessage::LobbyChat(chat) => {
                    self.echoes += 1;
                    let line = format!("[{}] {}", chat.user_id, chat.message);
                    if let Some(dropped) = self.chat_log.push(line) {
                        tracing::debug!(%dropped, "chat line scrolled off");
                    }
                }
                other => tracing::debug!(kind = other.kind_name(), "ignored server message"),
            }
        }

        if self.echoes == LINES.len() {
            self.link.disconnect();
        }
        Ok(true)
    }
}

fn main() -> Result<(), BangnetError> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };

    let reactor = Reactor::start()?;
    let server = lobby_server(&reactor, &settings)?;
    let port = server.local_addr().port();

    let mut player = Player {
        link: lobby_client(&reactor, &settings),
        chat_log: MessageQueue::bounded(CHAT_LOG_LINES),
        echoes: 0,
    };
    player.link.connect(format!("localhost:{port}"));

    for frame in 0..MAX_FRAMES {
        let started = Instant::now();
        run_server_frame(&server);
        if !player.run_frame()? {
            tracing::info!(frame, "done");
            break;
        }
        if let Some(rest) = FRAME.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    // Let the server see the client leave.
    run_server_frame(&server);

    for line in player.chat_log.drain() {
        println!("{line}");
    }
    if let Some(error) = player.link.last_error() {
        tracing::warn!(%error, "client ended with an error");
    }
    server.shutdown();
    Ok(())
}
