//! A framed, typed connection driven by a task on the reactor.
//!
//! The application side of a [`Connection`] never awaits: it pushes
//! encoded frames into an ordered channel and polls queues. One task per
//! link owns the byte stream, reads frames into the inbound queue and
//! writes whatever the channel yields.

use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bangnet_protocol::{Decode, Encode, FrameHeader, ProtocolError, decode_exact, encode_frame};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};

use crate::queue::lock;
use crate::state::StateCell;
use crate::{
    CloseReason, ConnectionConfig, ConnectionState, LinkEvent, MessageQueue, TransportError,
};

// ---------------------------------------------------------------------------
// Link state shared with the I/O task
// ---------------------------------------------------------------------------

/// State of one link, shared between the application and its I/O task.
///
/// A new link is created for every `connect()`. A task that outlives its
/// link sees it closed and can no longer deliver into the connection's
/// queues.
struct LinkShared<In> {
    state: StateCell,
    /// Set once the link has reported `Closed`. State changes and event
    /// pushes happen under this lock so `Established` can never follow
    /// `Closed`.
    closed: Mutex<bool>,
    /// Owned by the connection and handed to every link, so a reconnect
    /// keeps what the previous link already received.
    inbound: Arc<MessageQueue<In>>,
    events: Arc<MessageQueue<LinkEvent>>,
    last_error: Mutex<Option<String>>,
    address: String,
}

impl<In> LinkShared<In> {
    fn new(state: ConnectionState, address: String, queues: &ConnectionQueues<In>) -> Self {
        Self {
            state: StateCell::new(state),
            closed: Mutex::new(false),
            inbound: Arc::clone(&queues.inbound),
            events: Arc::clone(&queues.events),
            last_error: Mutex::new(None),
            address,
        }
    }

    fn advance(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let closed = lock(&self.closed);
        !*closed && self.state.transition(from, to)
    }

    fn establish(&self) -> bool {
        let closed = lock(&self.closed);
        if *closed
            || !self
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            return false;
        }
        self.events.push(LinkEvent::Established);
        true
    }

    /// Queues a received message unless the link has already closed.
    fn deliver(&self, message: In) {
        let closed = lock(&self.closed);
        if !*closed {
            self.inbound.push(message);
        }
    }

    /// Ends the link. Only the first call has any effect.
    fn close(&self, reason: CloseReason) -> bool {
        let mut closed = lock(&self.closed);
        if *closed {
            return false;
        }
        *closed = true;

        match &reason {
            CloseReason::Error(e) => {
                *lock(&self.last_error) = Some(e.to_string());
                self.state.set(ConnectionState::Error);
            }
            CloseReason::Local => {
                self.inbound.clear();
                self.state.set(ConnectionState::Disconnected);
            }
            CloseReason::PeerClosed => self.state.set(ConnectionState::Disconnected),
        }
        self.events.push(LinkEvent::Closed(reason));
        true
    }
}

/// Queues that outlive any single link of a [`Connection`].
struct ConnectionQueues<In> {
    inbound: Arc<MessageQueue<In>>,
    events: Arc<MessageQueue<LinkEvent>>,
}

/// The application's grip on a live link.
struct Link<In> {
    shared: Arc<LinkShared<In>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    shutdown: Arc<Notify>,
}

impl<In> Link<In> {
    fn close_local(&self) {
        if self.shared.close(CloseReason::Local) {
            tracing::info!(addr = %self.shared.address, "link closed locally");
        }
        // Stores a permit if the task is not waiting yet.
        self.shutdown.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One end of a framed link: receives `In` messages, sends `Out` messages.
///
/// A client uses [`connect`](Self::connect); a server wraps accepted
/// streams with [`attach`](Self::attach). Every method is synchronous and
/// safe to call from any thread.
///
/// Dropping the connection closes its link.
pub struct Connection<In, Out> {
    handle: Handle,
    config: ConnectionConfig,
    link: Mutex<Option<Link<In>>>,
    queues: ConnectionQueues<In>,
    _outgoing: PhantomData<fn(Out)>,
}

impl<In, Out> Connection<In, Out> {
    /// A disconnected connection whose I/O will run on `handle`.
    pub fn new(handle: Handle, config: ConnectionConfig) -> Self {
        Self {
            handle,
            config,
            link: Mutex::new(None),
            queues: ConnectionQueues {
                inbound: Arc::new(MessageQueue::new()),
                events: Arc::new(MessageQueue::new()),
            },
            _outgoing: PhantomData,
        }
    }

    /// Closes the link. Pending inbound messages are discarded and the
    /// socket is shut down by the I/O task.
    ///
    /// Reports `Closed(Local)` unless the link had already closed.
    pub fn disconnect(&self) {
        if let Some(link) = lock(&self.link).as_ref() {
            link.close_local();
        }
    }

    /// The state of the current link, `Disconnected` if there is none.
    pub fn state(&self) -> ConnectionState {
        lock(&self.link)
            .as_ref()
            .map_or(ConnectionState::Disconnected, |link| link.shared.state.get())
    }

    /// Whether the current link is up and carrying traffic.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The address of the current or last link, empty if there was none.
    pub fn address(&self) -> String {
        lock(&self.link)
            .as_ref()
            .map(|link| link.shared.address.clone())
            .unwrap_or_default()
    }

    /// Why the current or last link failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.link)
            .as_ref()
            .and_then(|link| lock(&link.shared.last_error).clone())
    }

    /// The next lifecycle event, oldest first.
    pub fn poll_event(&self) -> Option<LinkEvent> {
        self.queues.events.pop()
    }

    /// The settings every link of this connection uses.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl<In, Out> Connection<In, Out>
where
    In: Decode + Send + 'static,
    Out: Encode,
{
    /// Wraps an already open stream. The connection starts `Connected` and
    /// reports `Established` right away.
    ///
    /// `peer` is only used for [`address`](Self::address) and logging.
    pub fn attach<S>(
        handle: Handle,
        stream: S,
        peer: impl Into<String>,
        config: ConnectionConfig,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let connection = Self::new(handle, config);
        let peer = peer.into();
        let (outbound, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let shared = Arc::new(LinkShared::new(
            ConnectionState::Connected,
            peer,
            &connection.queues,
        ));
        connection.queues.events.push(LinkEvent::Established);

        connection.handle.spawn(run_session(
            Arc::clone(&shared),
            stream,
            rx,
            Arc::clone(&shutdown),
            connection.config.clone(),
        ));
        *lock(&connection.link) = Some(Link {
            shared,
            outbound,
            shutdown,
        });
        connection
    }

    /// Starts connecting to `address` (`"host:port"`).
    ///
    /// Returns immediately; progress shows in [`state`](Self::state) and
    /// [`poll_event`](Self::poll_event). A previous link is closed first.
    /// Messages pushed before the link is up are sent once it is.
    ///
    /// Messages a previous link received before the peer closed it stay
    /// readable; a live previous link is closed locally, which discards them.
    pub fn connect(&self, address: impl Into<String>) {
        let address = address.into();
        let (outbound, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let shared = Arc::new(LinkShared::new(
            ConnectionState::Resolving,
            address.clone(),
            &self.queues,
        ));

        let previous = lock(&self.link).replace(Link {
            shared: Arc::clone(&shared),
            outbound,
            shutdown: Arc::clone(&shutdown),
        });
        if let Some(previous) = previous {
            previous.close_local();
        }

        tracing::info!(%address, "connecting");
        self.handle
            .spawn(run_connect(shared, rx, shutdown, self.config.clone()));
    }

    /// Encodes `message` and queues it for sending.
    ///
    /// Messages are written in the order this method returns, even when
    /// called from several threads.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] when there is no link accepting
    /// outbound traffic, or [`TransportError::Protocol`] when the message
    /// cannot be encoded within the frame cap.
    pub fn push_message(&self, message: &Out) -> Result<(), TransportError> {
        let frame = encode_frame(message, self.config.max_frame_length)?;

        let guard = lock(&self.link);
        let link = guard.as_ref().ok_or(TransportError::NotConnected)?;
        if !link.shared.state.get().accepts_outbound() {
            return Err(TransportError::NotConnected);
        }
        link.outbound
            .send(frame)
            .map_err(|_| TransportError::NotConnected)
    }

    /// The oldest received message.
    pub fn pop_message(&self) -> Option<In> {
        self.queues.inbound.pop()
    }

    /// Whether [`pop_message`](Self::pop_message) would return a message.
    pub fn has_incoming(&self) -> bool {
        !self.queues.inbound.is_empty()
    }
}

impl<In, Out> Drop for Connection<In, Out> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<In, Out> std::fmt::Debug for Connection<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// I/O task
// ---------------------------------------------------------------------------

async fn run_connect<In>(
    shared: Arc<LinkShared<In>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: Arc<Notify>,
    config: ConnectionConfig,
) where
    In: Decode + Send + 'static,
{
    let established = tokio::select! {
        _ = shutdown.notified() => return,
        result = open_stream(&shared, config.nodelay) => result,
    };

    match established {
        Ok(stream) => {
            if !shared.establish() {
                return;
            }
            tracing::info!(addr = %shared.address, "link established");
            run_session(shared, stream, rx, shutdown, config).await;
        }
        Err(e) => {
            tracing::warn!(addr = %shared.address, error = %e, "connect failed");
            shared.close(CloseReason::Error(e));
        }
    }
}

/// Resolves the link's address and connects to the first endpoint that
/// accepts.
async fn open_stream<In>(
    shared: &LinkShared<In>,
    nodelay: bool,
) -> Result<TcpStream, TransportError> {
    let address = shared.address.as_str();
    let endpoints: Vec<SocketAddr> = tokio::net::lookup_host(address)
        .await
        .map_err(|source| TransportError::Resolve {
            addr: address.to_owned(),
            source,
        })?
        .collect();
    if endpoints.is_empty() {
        return Err(TransportError::NoAddress(address.to_owned()));
    }
    shared.advance(ConnectionState::Resolving, ConnectionState::Connecting);

    let mut last_error = None;
    for endpoint in endpoints {
        match TcpStream::connect(endpoint).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(nodelay) {
                    tracing::debug!(%endpoint, error = %e, "failed to set TCP_NODELAY");
                }
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%endpoint, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(TransportError::Connect {
        addr: address.to_owned(),
        source: last_error.unwrap_or_else(|| io::ErrorKind::NotConnected.into()),
    })
}

/// Pumps frames both ways until either direction ends or the application
/// disconnects.
async fn run_session<In, S>(
    shared: Arc<LinkShared<In>>,
    stream: S,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: Arc<Notify>,
    config: ConnectionConfig,
) where
    In: Decode + Send + 'static,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let reason = tokio::select! {
        _ = shutdown.notified() => CloseReason::Local,
        reason = read_loop(&shared, &mut reader, &config) => reason,
        reason = write_loop(&mut rx, &mut writer) => reason,
    };

    if let Err(e) = writer.shutdown().await {
        tracing::debug!(addr = %shared.address, error = %e, "socket shutdown failed");
    }

    let addr = shared.address.clone();
    match &reason {
        CloseReason::Error(e) => {
            tracing::warn!(%addr, error = %e, "link failed");
        }
        CloseReason::PeerClosed => tracing::info!(%addr, "link closed by peer"),
        CloseReason::Local => {}
    }
    shared.close(reason);
}

async fn read_loop<In, R>(
    shared: &LinkShared<In>,
    reader: &mut R,
    config: &ConnectionConfig,
) -> CloseReason
where
    In: Decode,
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(reader, config).await {
            Ok(Some(message)) => shared.deliver(message),
            Ok(None) => return CloseReason::PeerClosed,
            Err(e) => return CloseReason::Error(e),
        }
    }
}

/// Reads one frame. `Ok(None)` means the stream ended cleanly before a new
/// header started.
async fn read_frame<In, R>(
    reader: &mut R,
    config: &ConnectionConfig,
) -> Result<Option<In>, TransportError>
where
    In: Decode,
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; FrameHeader::SIZE];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader
            .read(&mut head[filled..])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransportError::ReceiveFailed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside a frame header",
            )));
        }
        filled += n;
    }

    let header = FrameHeader::from_bytes(head);
    header
        .check(config.max_frame_length)
        .map_err(ProtocolError::from)?;

    // Bounded by the check above.
    let mut body = vec![0u8; header.length as usize];
    let limit = config.body_timeout();
    match tokio::time::timeout(limit, reader.read_exact(&mut body)).await {
        Ok(read) => {
            read.map_err(TransportError::ReceiveFailed)?;
        }
        Err(_) => return Err(TransportError::Timeout(limit)),
    }
    tracing::trace!(length = header.length, "frame received");

    let message = decode_exact::<In>(&body).map_err(ProtocolError::from)?;
    Ok(Some(message))
}

async fn write_loop<W>(rx: &mut mpsc::UnboundedReceiver<Bytes>, writer: &mut W) -> CloseReason
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            return CloseReason::Error(TransportError::SendFailed(e));
        }
        if let Err(e) = writer.flush().await {
            return CloseReason::Error(TransportError::SendFailed(e));
        }
        tracing::trace!(length = frame.len(), "frame sent");
    }
    // Every sender is gone: the application dropped the link.
    CloseReason::Local
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bangnet_protocol::{DecodeError, FrameError, MAGIC, encode_to_bytes};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;

    type Peer = Connection<String, String>;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met within 2s");
    }

    /// Waits for the next lifecycle event.
    async fn next_event(conn: &Peer) -> LinkEvent {
        for _ in 0..400 {
            if let Some(event) = conn.poll_event() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no event within 2s");
    }

    fn attach(stream: DuplexStream, config: ConnectionConfig) -> Peer {
        Connection::attach(Handle::current(), stream, "duplex", config)
    }

    fn raw_frame(magic: u32, length: u32, body: &[u8]) -> Vec<u8> {
        let mut out = FrameHeader { magic, length }.to_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    fn expect_error(event: LinkEvent) -> TransportError {
        match event {
            LinkEvent::Closed(CloseReason::Error(e)) => e,
            other => panic!("expected an error close, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_attach_reports_established() {
        let (local, _remote) = tokio::io::duplex(1024);
        let conn = attach(local, ConnectionConfig::default());
        assert!(conn.is_connected());
        assert_eq!(conn.address(), "duplex");
        assert!(matches!(conn.poll_event(), Some(LinkEvent::Established)));
        assert!(conn.poll_event().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_messages_flow_both_ways() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let left = attach(a, ConnectionConfig::default());
        let right = attach(b, ConnectionConfig::default());

        left.push_message(&"ping".to_string()).unwrap();
        wait_until(|| right.has_incoming()).await;
        assert_eq!(right.pop_message().as_deref(), Some("ping"));

        right.push_message(&"pong".to_string()).unwrap();
        wait_until(|| left.has_incoming()).await;
        assert_eq!(left.pop_message().as_deref(), Some("pong"));
        assert!(left.pop_message().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_wire_order_matches_push_order() {
        let (a, b) = tokio::io::duplex(4 * 1024);
        let left = attach(a, ConnectionConfig::default());
        let right = attach(b, ConnectionConfig::default());

        for i in 0..200 {
            left.push_message(&format!("msg-{i}")).unwrap();
        }
        let mut received = Vec::new();
        wait_until(|| {
            while let Some(message) = right.pop_message() {
                received.push(message);
            }
            received.len() == 200
        })
        .await;
        let expected: Vec<_> = (0..200).map(|i| format!("msg-{i}")).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_order_holds_across_threads() {
        let (a, b) = tokio::io::duplex(4 * 1024);
        let left = Arc::new(attach(a, ConnectionConfig::default()));
        let right = attach(b, ConnectionConfig::default());

        // The counter is taken under the same lock as the push, so its
        // value is the global call order.
        let next = Arc::new(Mutex::new(0u32));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let left = Arc::clone(&left);
                let next = Arc::clone(&next);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let mut n = next.lock().unwrap();
                        left.push_message(&n.to_string()).unwrap();
                        *n += 1;
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let mut received = Vec::new();
        wait_until(|| {
            while let Some(message) = right.pop_message() {
                received.push(message);
            }
            received.len() == 200
        })
        .await;
        let expected: Vec<_> = (0..200).map(|i: u32| i.to_string()).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oversized_header_closes_before_body() {
        let config = ConnectionConfig {
            max_frame_length: 1024,
            ..Default::default()
        };
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let conn = attach(local, config);
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        remote.write_all(&raw_frame(MAGIC, 1025, &[])).await.unwrap();

        let err = expect_error(next_event(&conn).await);
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::Frame(FrameError::TooLong {
                length: 1025,
                max: 1024
            }))
        ));
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(conn.last_error().unwrap().contains("1025"));
        assert!(conn.pop_message().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_huge_length_is_rejected_without_allocating() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let conn = attach(local, ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        remote.write_all(&raw_frame(MAGIC, u32::MAX, &[])).await.unwrap();

        let err = expect_error(next_event(&conn).await);
        assert!(err.is_protocol_violation());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_magic_closes_without_reading_body() {
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let conn = attach(local, ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        // A valid frame follows the bad header; it must not be delivered.
        let body = encode_to_bytes(&String::from("sneaky")).unwrap();
        let mut bytes = raw_frame(0x4241_4E48, body.len() as u32, &body);
        bytes.extend(raw_frame(MAGIC, body.len() as u32, &body));
        remote.write_all(&bytes).await.unwrap();

        let err = expect_error(next_event(&conn).await);
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::Frame(FrameError::BadMagic { .. }))
        ));
        assert!(conn.pop_message().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_truncated_body_times_out() {
        let config = ConnectionConfig {
            body_timeout_ms: 100,
            ..Default::default()
        };
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let conn = attach(local, config);
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        // Header announces 100 bytes, only 40 arrive, then the peer stalls.
        remote.write_all(&raw_frame(MAGIC, 100, &[0u8; 40])).await.unwrap();

        let err = expect_error(next_event(&conn).await);
        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(100)));
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(conn.pop_message().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_idle_link_is_not_timed_out() {
        let config = ConnectionConfig {
            body_timeout_ms: 50,
            ..Default::default()
        };
        let (local, _remote) = tokio::io::duplex(1024);
        let conn = attach(local, config);
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(conn.is_connected());
        assert!(conn.poll_event().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_undecodable_body_is_fatal() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let conn = attach(local, ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        // String length 2 followed by one extra byte.
        remote
            .write_all(&raw_frame(MAGIC, 5, &[0, 2, b'h', b'i', b'!']))
            .await
            .unwrap();

        let err = expect_error(next_event(&conn).await);
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::Decode(DecodeError::BufferUnderflow {
                trailing: 1
            }))
        ));
        assert!(conn.pop_message().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_eof_mid_header_is_an_error() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let conn = attach(local, ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        remote.write_all(&MAGIC.to_be_bytes()).await.unwrap();
        drop(remote);

        let err = expect_error(next_event(&conn).await);
        assert!(matches!(err, TransportError::ReceiveFailed(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clean_peer_close_keeps_received_messages() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let conn = attach(local, ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        let body = encode_to_bytes(&String::from("last words")).unwrap();
        remote
            .write_all(&raw_frame(MAGIC, body.len() as u32, &body))
            .await
            .unwrap();
        drop(remote);

        assert!(matches!(
            next_event(&conn).await,
            LinkEvent::Closed(CloseReason::PeerClosed)
        ));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.last_error().is_none());
        assert_eq!(conn.pop_message().as_deref(), Some("last words"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_reports_local_once() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let conn = attach(local, ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        conn.disconnect();
        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(
            conn.poll_event(),
            Some(LinkEvent::Closed(CloseReason::Local))
        ));

        // The I/O task shuts the socket down; the peer sees EOF.
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), remote.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
        assert!(conn.poll_event().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_discards_pending_inbound() {
        let (a, b) = tokio::io::duplex(1024);
        let left = attach(a, ConnectionConfig::default());
        let right = attach(b, ConnectionConfig::default());
        left.push_message(&"unread".to_string()).unwrap();
        wait_until(|| right.has_incoming()).await;

        right.disconnect();
        assert!(!right.has_incoming());
        assert!(right.pop_message().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_requires_a_link() {
        let conn: Peer = Connection::new(Handle::current(), ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(
            conn.push_message(&"hello".to_string()),
            Err(TransportError::NotConnected)
        ));

        let (local, _remote) = tokio::io::duplex(1024);
        let conn = attach(local, ConnectionConfig::default());
        conn.disconnect();
        assert!(matches!(
            conn.push_message(&"hello".to_string()),
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oversized_outgoing_message_is_refused() {
        let config = ConnectionConfig {
            max_frame_length: 8,
            ..Default::default()
        };
        let (local, _remote) = tokio::io::duplex(1024);
        let conn = attach(local, config);
        let err = conn.push_message(&"far too long".to_string()).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(conn.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unresolvable_address_fails() {
        let conn: Peer = Connection::new(Handle::current(), ConnectionConfig::default());
        conn.connect("no port here");
        let err = expect_error(next_event(&conn).await);
        assert!(matches!(err, TransportError::Resolve { .. }));
        assert_eq!(conn.state(), ConnectionState::Error);
        assert_eq!(conn.address(), "no port here");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refused_connect_fails() {
        // Grab a free port, then close it so nothing listens there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let conn: Peer = Connection::new(Handle::current(), ConnectionConfig::default());
        conn.connect(format!("127.0.0.1:{port}"));
        let err = expect_error(next_event(&conn).await);
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(conn.last_error().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connect_over_loopback() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let conn: Peer = Connection::new(Handle::current(), ConnectionConfig::default());
        conn.connect(addr.to_string());
        // Queued before the link is up, written once it is.
        conn.push_message(&"early".to_string()).unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let server: Peer =
            Connection::attach(Handle::current(), stream, "client", ConnectionConfig::default());

        assert!(matches!(next_event(&conn).await, LinkEvent::Established));
        assert!(conn.is_connected());
        wait_until(|| server.has_incoming()).await;
        assert_eq!(server.pop_message().as_deref(), Some("early"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconnect_closes_previous_link() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let conn: Peer = Connection::new(Handle::current(), ConnectionConfig::default());
        conn.connect(addr.clone());
        let (_first, _) = listener.accept().await.unwrap();
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        conn.connect(addr);
        assert!(matches!(
            conn.poll_event(),
            Some(LinkEvent::Closed(CloseReason::Local))
        ));
        let (_second, _) = listener.accept().await.unwrap();
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));
        assert!(conn.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconnect_keeps_messages_from_closed_link() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let conn: Peer = Connection::new(Handle::current(), ConnectionConfig::default());
        conn.connect(addr.clone());
        let (stream, _) = listener.accept().await.unwrap();
        let server: Peer =
            Connection::attach(Handle::current(), stream, "client", ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        server.push_message(&"delivered".to_string()).unwrap();
        wait_until(|| conn.has_incoming()).await;
        drop(server);
        assert!(matches!(
            next_event(&conn).await,
            LinkEvent::Closed(CloseReason::PeerClosed)
        ));

        conn.connect(addr);
        let (_second, _) = listener.accept().await.unwrap();
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));
        assert_eq!(conn.pop_message().as_deref(), Some("delivered"));
        assert!(conn.pop_message().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconnect_discards_unread_messages_of_live_link() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let conn: Peer = Connection::new(Handle::current(), ConnectionConfig::default());
        conn.connect(addr.clone());
        let (stream, _) = listener.accept().await.unwrap();
        let server: Peer =
            Connection::attach(Handle::current(), stream, "client", ConnectionConfig::default());
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));

        server.push_message(&"stale".to_string()).unwrap();
        wait_until(|| conn.has_incoming()).await;

        conn.connect(addr);
        assert!(!conn.has_incoming());
        let (_second, _) = listener.accept().await.unwrap();
        assert!(matches!(
            next_event(&conn).await,
            LinkEvent::Closed(CloseReason::Local)
        ));
        assert!(matches!(next_event(&conn).await, LinkEvent::Established));
        assert!(conn.pop_message().is_none());
    }
}
