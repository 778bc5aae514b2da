//! Connection handle and the stream I/O tasks behind it.
//!
//! # Responsibilities
//! - Own one input/output stream pair for a single peer
//! - Open/close lifecycle, with any single-stream closure tearing down both
//! - Read path: forward each chunk read into a fixed buffer as one data event
//! - Write path: FIFO queue, one write completion per chunk flushed
//!
//! The handle only posts commands; the reactor owns the streams' state and
//! runs every listener callback.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{ConnectionError, WriteError};
use crate::net::events::{ConnectionListener, StreamDirection, WriteCompletion};
use crate::net::reactor::{IoEvent, Message, Reactor};

/// Read half owned by a connection.
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;
/// Write half owned by a connection.
pub type OutputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State shared by every clone of a [`Connection`].
pub(crate) struct Shared {
    id: ConnectionId,
    closed: Arc<AtomicBool>,
    peer_addr: Option<SocketAddr>,
    reactor: Reactor,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let _ = self.reactor.send(Message::Release(self.id));
    }
}

/// A managed, observable channel over one pair of byte streams.
///
/// Clones refer to the same connection. Dropping the last clone releases the
/// streams without notifying the listener.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Wrap an already-connected stream pair. The connection starts unopened.
    pub fn new<R, W>(reactor: &Reactor, input: R, output: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_peer(reactor, Box::new(input), Box::new(output), None)
    }

    /// Wrap a connected TCP stream, splitting it into its two directions.
    pub fn from_tcp(reactor: &Reactor, stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let (read, write) = stream.into_split();
        Self::with_peer(reactor, Box::new(read), Box::new(write), peer_addr)
    }

    fn with_peer(
        reactor: &Reactor,
        input: InputStream,
        output: OutputStream,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        let id = ConnectionId::next();
        let closed = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared {
            id,
            closed: Arc::clone(&closed),
            peer_addr,
            reactor: reactor.clone(),
        });

        let registered = reactor.send(Message::Register {
            id,
            handle: Arc::downgrade(&shared),
            closed: Arc::clone(&closed),
            input,
            output,
        });
        if registered.is_err() {
            tracing::warn!(connection_id = %id, "Reactor stopped, connection created closed");
            closed.store(true, Ordering::Release);
        }

        Self { shared }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Process-unique identifier, also used as the `connection_id` log field.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Remote address, for socket-backed connections.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer_addr
    }

    /// Whether the connection has been closed, locally or by the peer.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Attach the observer for this connection. Only a weak reference is kept.
    ///
    /// Set the listener before calling [`open`](Self::open) to observe every event.
    pub fn set_listener(&self, listener: &Arc<ConnectionListener>) {
        let _ = self.shared.reactor.send(Message::SetListener {
            id: self.shared.id,
            listener: Arc::downgrade(listener),
        });
    }

    /// Schedule both streams. Each direction reports its own open event once
    /// ready. Calling this again is a no-op.
    pub fn open(&self) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.shared.reactor.send(Message::Open(self.shared.id))
    }

    /// Close both streams, discarding unflushed writes. Idempotent.
    pub fn close(&self) {
        self.close_stream(StreamDirection::Input);
    }

    /// Close the named direction. Half-open connections are not supported, so
    /// the other direction is closed right after it.
    pub fn close_stream(&self, direction: StreamDirection) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(connection_id = %self.shared.id, %direction, "Closing connection");
        let _ = self.shared.reactor.send(Message::Close {
            id: self.shared.id,
            first: direction,
            handle: self.clone(),
        });
    }

    /// Queue bytes for transmission. Returns immediately; progress is reported
    /// through the listener's write slot in the order sends were issued.
    pub fn send_data(&self, data: impl Into<Bytes>) -> Result<(), ConnectionError> {
        let data = data.into();
        if data.is_empty() {
            return Err(ConnectionError::EmptyPayload);
        }
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.shared.reactor.send(Message::Send {
            id: self.shared.id,
            data,
        })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("peer_addr", &self.shared.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for Connection {}

fn post(events: &mpsc::UnboundedSender<Message>, id: ConnectionId, event: IoEvent) -> bool {
    events.send(Message::Io { id, event }).is_ok()
}

/// Drain the input stream into data events until EOF or error.
pub(crate) async fn read_stream(
    id: ConnectionId,
    mut input: InputStream,
    capacity: usize,
    events: mpsc::UnboundedSender<Message>,
) {
    if !post(&events, id, IoEvent::Opened(StreamDirection::Input)) {
        return;
    }

    let mut buf = BytesMut::with_capacity(capacity);
    loop {
        buf.reserve(capacity);
        // Each chunk is capped at the configured capacity.
        let mut limited = (&mut buf).limit(capacity);
        let event = match input.read_buf(&mut limited).await {
            Ok(0) => IoEvent::Ended(StreamDirection::Input),
            Ok(_) => IoEvent::Data(buf.split().freeze()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => IoEvent::Failed(StreamDirection::Input, e),
        };
        let terminal = matches!(event, IoEvent::Ended(_) | IoEvent::Failed(..));
        if !post(&events, id, event) || terminal {
            return;
        }
    }
}

/// Flush queued sends in order, reporting each chunk the stream accepts.
pub(crate) async fn write_stream(
    id: ConnectionId,
    mut output: OutputStream,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<Message>,
) {
    if !post(&events, id, IoEvent::Opened(StreamDirection::Output)) {
        return;
    }

    while let Some(mut data) = queue.recv().await {
        while !data.is_empty() {
            let result = match output.write(&data).await {
                Ok(0) => Err(io::Error::from(io::ErrorKind::WriteZero)),
                other => other,
            };
            match result {
                Ok(n) => {
                    let _ = data.split_to(n);
                    let completion = WriteCompletion {
                        bytes: n,
                        error: None,
                    };
                    if !post(&events, id, IoEvent::Written(completion)) {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let error = WriteError::from(&e);
                    let fatal = error.is_fatal();
                    let completion = WriteCompletion {
                        bytes: data.len(),
                        error: Some(error),
                    };
                    post(&events, id, IoEvent::Written(completion));
                    if fatal {
                        post(&events, id, IoEvent::Failed(StreamDirection::Output, e));
                        return;
                    }
                    // Drop the rest of this send and move on to the next one.
                    break;
                }
            }
        }

        if let Err(e) = output.flush().await {
            post(&events, id, IoEvent::Failed(StreamDirection::Output, e));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::next();
        let id2 = ConnectionId::next();
        assert_ne!(id1, id2);
        assert!(id2 > id1);
        assert_eq!(id1.to_string(), format!("conn-{}", id1.as_u64()));
    }

    #[tokio::test]
    async fn empty_payload_rejected() {
        let reactor = Reactor::spawn(&ConnectionConfig::default());
        let (a, _b) = tokio::io::duplex(64);
        let (read, write) = tokio::io::split(a);
        let connection = Connection::new(&reactor, read, write);

        assert_eq!(connection.send_data(Bytes::new()), Err(ConnectionError::EmptyPayload));
    }

    #[tokio::test]
    async fn send_after_close_rejected() {
        let reactor = Reactor::spawn(&ConnectionConfig::default());
        let (a, _b) = tokio::io::duplex(64);
        let (read, write) = tokio::io::split(a);
        let connection = Connection::new(&reactor, read, write);

        connection.close();
        connection.close();
        assert!(connection.is_closed());
        assert_eq!(connection.send_data(&b"late"[..]), Err(ConnectionError::Closed));
        assert_eq!(connection.open(), Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn stopped_reactor_yields_closed_connection() {
        let reactor = Reactor::spawn(&ConnectionConfig::default());
        reactor.shutdown();
        while reactor.is_running() {
            tokio::task::yield_now().await;
        }

        let (a, _b) = tokio::io::duplex(64);
        let (read, write) = tokio::io::split(a);
        let connection = Connection::new(&reactor, read, write);
        assert!(connection.is_closed());
    }
}
