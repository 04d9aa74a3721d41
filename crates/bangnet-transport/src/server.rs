//! Accepts TCP peers and gives each one an attached [`Connection`].
//!
//! The accept loop runs on the reactor. The application polls
//! [`ConnectionServer::poll_events`] from its own loop and answers through
//! [`ConnectionServer::push_message`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bangnet_protocol::{Decode, Encode};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::queue::lock;
use crate::{ClientId, CloseReason, Connection, LinkEvent, ServerConfig, TransportError};

/// Pause after a failed accept, so a persistent error (e.g. out of file
/// descriptors) does not spin the reactor.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Something that happened on the server since the last poll.
#[derive(Debug)]
pub enum ServerEvent<In> {
    /// A peer was accepted.
    Connected { id: ClientId, addr: SocketAddr },
    /// A peer sent a message.
    Message { id: ClientId, message: In },
    /// A peer's link ended. The id is no longer valid.
    Disconnected { id: ClientId, reason: CloseReason },
}

struct Clients<In, Out> {
    live: BTreeMap<ClientId, Connection<In, Out>>,
    /// `Connected` events, queued with the insert so they precede the
    /// client's first message.
    pending: Vec<ServerEvent<In>>,
}

struct ServerShared<In, Out> {
    clients: Mutex<Clients<In, Out>>,
    next_id: AtomicU64,
    config: ServerConfig,
}

impl<In, Out> ServerShared<In, Out>
where
    In: Decode + Send + 'static,
    Out: Encode,
{
    fn admit(&self, stream: TcpStream, addr: SocketAddr, handle: &Handle) {
        let mut clients = lock(&self.clients);
        // Closed clients stay in `live` until the next poll; they no longer
        // hold a slot.
        let open = clients
            .live
            .values()
            .filter(|connection| connection.state().accepts_outbound())
            .count();
        if open >= self.config.max_clients {
            tracing::warn!(
                %addr,
                max_clients = self.config.max_clients,
                "server full, refusing peer"
            );
            return;
        }
        if let Err(e) = stream.set_nodelay(self.config.connection.nodelay) {
            tracing::debug!(%addr, error = %e, "failed to set TCP_NODELAY");
        }

        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Connection::attach(
            handle.clone(),
            stream,
            addr.to_string(),
            self.config.connection.clone(),
        );
        // `attach` reports `Established`; the server reports `Connected`.
        let _ = connection.poll_event();
        clients.live.insert(id, connection);
        clients.pending.push(ServerEvent::Connected { id, addr });
        tracing::info!(%id, %addr, "client connected");
    }
}

async fn accept_loop<In, Out>(
    listener: TcpListener,
    shared: Arc<ServerShared<In, Out>>,
    handle: Handle,
) where
    In: Decode + Send + 'static,
    Out: Encode,
{
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => shared.admit(stream, addr, &handle),
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// A listening server holding one [`Connection`] per accepted peer.
///
/// `In` is what clients send, `Out` is what the server answers with.
pub struct ConnectionServer<In, Out> {
    shared: Arc<ServerShared<In, Out>>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl<In, Out> ConnectionServer<In, Out>
where
    In: Decode + Send + 'static,
    Out: Encode + 'static,
{
    /// Binds `config.bind_addr` and starts accepting on `handle`.
    ///
    /// Binding is synchronous, so a port conflict is reported here rather
    /// than through an event.
    pub fn bind(handle: Handle, config: ServerConfig) -> Result<Self, TransportError> {
        let std_listener =
            std::net::TcpListener::bind(&config.bind_addr).map_err(TransportError::BindFailed)?;
        std_listener
            .set_nonblocking(true)
            .map_err(TransportError::BindFailed)?;
        let local_addr = std_listener
            .local_addr()
            .map_err(TransportError::BindFailed)?;

        let listener = {
            let _guard = handle.enter();
            TcpListener::from_std(std_listener).map_err(TransportError::BindFailed)?
        };

        let shared = Arc::new(ServerShared {
            clients: Mutex::new(Clients {
                live: BTreeMap::new(),
                pending: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
            config,
        });
        let accept_task =
            handle.spawn(accept_loop(listener, Arc::clone(&shared), handle.clone()));
        tracing::info!(%local_addr, "server listening");

        Ok(Self {
            shared,
            local_addr,
            accept_task,
        })
    }
}

impl<In, Out> ConnectionServer<In, Out> {
    /// The address actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The settings the server was bound with.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Clients not yet reported as `Disconnected`.
    pub fn client_count(&self) -> usize {
        lock(&self.shared.clients).live.len()
    }

    /// Ids of every live client, in connection order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        lock(&self.shared.clients).live.keys().copied().collect()
    }

    /// The peer address of a live client.
    pub fn client_address(&self, id: ClientId) -> Option<String> {
        lock(&self.shared.clients)
            .live
            .get(&id)
            .map(Connection::address)
    }

    /// Closes one client's link. Its `Disconnected` event follows on the
    /// next poll.
    pub fn disconnect(&self, id: ClientId) -> Result<(), TransportError> {
        let clients = lock(&self.shared.clients);
        let connection = clients
            .live
            .get(&id)
            .ok_or(TransportError::UnknownClient(id))?;
        connection.disconnect();
        Ok(())
    }

    /// Stops accepting and closes every client.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        let clients = lock(&self.shared.clients);
        for connection in clients.live.values() {
            connection.disconnect();
        }
        tracing::info!(
            local_addr = %self.local_addr,
            clients = clients.live.len(),
            "server shut down"
        );
    }
}

impl<In, Out> ConnectionServer<In, Out>
where
    In: Decode + Send + 'static,
    Out: Encode,
{
    /// Everything that happened since the last call.
    ///
    /// For each client, `Connected` comes first, then its messages in wire
    /// order, then `Disconnected`. Disconnected clients are forgotten.
    pub fn poll_events(&self) -> Vec<ServerEvent<In>> {
        let mut clients = lock(&self.shared.clients);
        let mut events = std::mem::take(&mut clients.pending);
        let mut gone = Vec::new();

        for (&id, connection) in &clients.live {
            drain_messages(id, connection, &mut events);
            while let Some(event) = connection.poll_event() {
                if let LinkEvent::Closed(reason) = event {
                    // Messages can land between the drain and the close.
                    drain_messages(id, connection, &mut events);
                    events.push(ServerEvent::Disconnected { id, reason });
                    gone.push(id);
                }
            }
        }

        for id in gone {
            clients.live.remove(&id);
            tracing::info!(%id, "client disconnected");
        }
        events
    }

    /// Queues `message` for one client.
    pub fn push_message(&self, id: ClientId, message: &Out) -> Result<(), TransportError> {
        let clients = lock(&self.shared.clients);
        let connection = clients
            .live
            .get(&id)
            .ok_or(TransportError::UnknownClient(id))?;
        connection.push_message(message)
    }

    /// Queues `message` for every live client. Clients whose link is
    /// already closing are skipped.
    pub fn broadcast(&self, message: &Out) -> usize {
        let clients = lock(&self.shared.clients);
        clients
            .live
            .values()
            .filter(|connection| connection.push_message(message).is_ok())
            .count()
    }
}

fn drain_messages<In, Out>(
    id: ClientId,
    connection: &Connection<In, Out>,
    events: &mut Vec<ServerEvent<In>>,
) where
    In: Decode + Send + 'static,
    Out: Encode,
{
    while let Some(message) = connection.pop_message() {
        events.push(ServerEvent::Message { id, message });
    }
}

impl<In, Out> Drop for ConnectionServer<In, Out> {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl<In, Out> std::fmt::Debug for ConnectionServer<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionServer")
            .field("local_addr", &self.local_addr)
            .field("clients", &self.client_count())
            .finish_non_exhaustive()
    }
}
