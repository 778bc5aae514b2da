//! Listener registrations for connection, server and client events.
//!
//! Each listener is a set of independent slots; a slot left empty means the
//! event is simply not observed. The core only ever holds a [`Weak`] reference
//! to a listener, so dropping the listener's last `Arc` silently stops delivery.
//!
//! All callbacks run on the reactor task. They must not block; calls back into
//! the core (`send_data`, `close`, ...) are queued and never re-enter.

use std::fmt;
use std::sync::Weak;

use bytes::Bytes;

use crate::error::{SocketError, WriteError};
use crate::net::connection::Connection;
use crate::net::endpoint::IpFamily;

/// Input (read) or output (write) half of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    Input,
    Output,
}

impl StreamDirection {
    /// The other half of the connection.
    pub fn opposite(self) -> Self {
        match self {
            StreamDirection::Input => StreamDirection::Output,
            StreamDirection::Output => StreamDirection::Input,
        }
    }
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamDirection::Input => write!(f, "input"),
            StreamDirection::Output => write!(f, "output"),
        }
    }
}

/// Outcome of one chunk handed to the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCompletion {
    /// Bytes written, or attempted when `error` is set.
    pub bytes: usize,
    pub error: Option<WriteError>,
}

impl WriteCompletion {
    /// Whether the chunk was written without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

type StreamFn = dyn Fn(&Connection, StreamDirection) + Send + Sync;
type DataFn = dyn Fn(&Connection, Bytes) + Send + Sync;
type WriteFn = dyn Fn(&Connection, WriteCompletion) + Send + Sync;
type ConnectionFn = dyn Fn(Connection) + Send + Sync;
type BindFailedFn = dyn Fn(IpFamily, SocketError) + Send + Sync;
type FailureFn = dyn Fn(SocketError) + Send + Sync;

/// Observer of a single [`Connection`].
#[derive(Default)]
pub struct ConnectionListener {
    stream_opened: Option<Box<StreamFn>>,
    stream_closed: Option<Box<StreamFn>>,
    data: Option<Box<DataFn>>,
    write: Option<Box<WriteFn>>,
}

impl ConnectionListener {
    /// Create a connection listener with no slots set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per direction as each stream becomes ready.
    pub fn on_stream_opened<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection, StreamDirection) + Send + Sync + 'static,
    {
        self.stream_opened = Some(Box::new(f));
        self
    }

    /// Called once per direction that had been reported open.
    pub fn on_stream_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection, StreamDirection) + Send + Sync + 'static,
    {
        self.stream_closed = Some(Box::new(f));
        self
    }

    /// Called with each chunk read from the input stream, unframed.
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection, Bytes) + Send + Sync + 'static,
    {
        self.data = Some(Box::new(f));
        self
    }

    /// Called per chunk flushed (or failed) on the output stream, in send order.
    pub fn on_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection, WriteCompletion) + Send + Sync + 'static,
    {
        self.write = Some(Box::new(f));
        self
    }

    pub(crate) fn stream_opened(&self, connection: &Connection, direction: StreamDirection) {
        if let Some(f) = &self.stream_opened {
            f(connection, direction);
        }
    }

    pub(crate) fn stream_closed(&self, connection: &Connection, direction: StreamDirection) {
        if let Some(f) = &self.stream_closed {
            f(connection, direction);
        }
    }

    pub(crate) fn data(&self, connection: &Connection, data: Bytes) {
        if let Some(f) = &self.data {
            f(connection, data);
        }
    }

    pub(crate) fn write(&self, connection: &Connection, completion: WriteCompletion) {
        if let Some(f) = &self.write {
            f(connection, completion);
        }
    }
}

impl fmt::Debug for ConnectionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionListener")
            .field("stream_opened", &self.stream_opened.is_some())
            .field("stream_closed", &self.stream_closed.is_some())
            .field("data", &self.data.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// Observer of a [`ServerSocket`](crate::net::ServerSocket).
#[derive(Default)]
pub struct ServerListener {
    connection: Option<Box<ConnectionFn>>,
    bind_failed: Option<Box<BindFailedFn>>,
}

impl ServerListener {
    /// Create a server listener with no slots set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives ownership of each accepted, not yet opened, connection.
    pub fn on_connection<F>(mut self, f: F) -> Self
    where
        F: Fn(Connection) + Send + Sync + 'static,
    {
        self.connection = Some(Box::new(f));
        self
    }

    /// Called once for each address family that failed to bind.
    pub fn on_bind_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(IpFamily, SocketError) + Send + Sync + 'static,
    {
        self.bind_failed = Some(Box::new(f));
        self
    }

    pub(crate) fn connection_created(&self, connection: Connection) {
        if let Some(f) = &self.connection {
            f(connection);
        }
    }

    pub(crate) fn bind_failed(&self, family: IpFamily, error: SocketError) {
        if let Some(f) = &self.bind_failed {
            f(family, error);
        }
    }
}

impl fmt::Debug for ServerListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerListener")
            .field("connection", &self.connection.is_some())
            .field("bind_failed", &self.bind_failed.is_some())
            .finish()
    }
}

/// Observer of a [`ClientSocket`](crate::net::ClientSocket) attempt.
#[derive(Default)]
pub struct ClientListener {
    connection: Option<Box<ConnectionFn>>,
    failure: Option<Box<FailureFn>>,
}

impl ClientListener {
    /// Create a client listener with no slots set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives the connection once the attempt succeeds.
    pub fn on_connection<F>(mut self, f: F) -> Self
    where
        F: Fn(Connection) + Send + Sync + 'static,
    {
        self.connection = Some(Box::new(f));
        self
    }

    /// Receives the error once the attempt fails.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(SocketError) + Send + Sync + 'static,
    {
        self.failure = Some(Box::new(f));
        self
    }

    pub(crate) fn connection_created(&self, connection: Connection) {
        if let Some(f) = &self.connection {
            f(connection);
        }
    }

    pub(crate) fn connection_failed(&self, error: SocketError) {
        if let Some(f) = &self.failure {
            f(error);
        }
    }
}

impl fmt::Debug for ClientListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientListener")
            .field("connection", &self.connection.is_some())
            .field("failure", &self.failure.is_some())
            .finish()
    }
}

/// Upgrade a listener reference, logging when it has gone away.
pub(crate) fn live<T>(listener: &Weak<T>, event: &'static str) -> Option<std::sync::Arc<T>> {
    let upgraded = listener.upgrade();
    if upgraded.is_none() {
        tracing::trace!(event, "Listener dropped, skipping notification");
    }
    upgraded
}
