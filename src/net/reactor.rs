//! Single-task event dispatcher.
//!
//! The reactor owns the registration table of every live [`Connection`] and is
//! the only place listener callbacks are invoked. Handles on any thread talk to
//! it through one unbounded channel; per-stream I/O tasks post their readiness,
//! data and write results into the same channel. A single channel keeps every
//! event for a connection in the order it was produced.
//!
//! ```text
//! Connection handle ──┐
//! ServerSocket accept ─┼─▶ channel ─▶ EventLoop ─▶ listener callbacks
//! read/write tasks ────┘                 │
//!                                        └─▶ spawns read/write tasks on open
//! ```

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{sanitize_connection, ConnectionConfig};
use crate::error::ConnectionError;
use crate::net::connection::{self, Connection, ConnectionId, InputStream, OutputStream, Shared};
use crate::net::events::{live, ConnectionListener, StreamDirection, WriteCompletion};

/// Work item delivered to the event loop.
pub(crate) enum Message {
    Register {
        id: ConnectionId,
        handle: Weak<Shared>,
        closed: Arc<AtomicBool>,
        input: InputStream,
        output: OutputStream,
    },
    SetListener {
        id: ConnectionId,
        listener: Weak<ConnectionListener>,
    },
    Open(ConnectionId),
    Send {
        id: ConnectionId,
        data: Bytes,
    },
    /// Carries a strong handle so the close is still reported when the
    /// caller drops its last handle right after closing.
    Close {
        id: ConnectionId,
        first: StreamDirection,
        handle: Connection,
    },
    /// Last handle dropped: release streams without notifying.
    Release(ConnectionId),
    Dispatch(Box<dyn FnOnce() + Send>),
    Io {
        id: ConnectionId,
        event: IoEvent,
    },
    Shutdown,
}

/// Something a read or write task observed on its stream.
pub(crate) enum IoEvent {
    Opened(StreamDirection),
    Data(Bytes),
    Written(WriteCompletion),
    Ended(StreamDirection),
    Failed(StreamDirection, io::Error),
}

/// Handle to the process's event loop. Cheap to clone.
#[derive(Clone)]
pub struct Reactor {
    tx: mpsc::UnboundedSender<Message>,
    read_buffer_size: usize,
    connect_timeout: Duration,
}

impl Reactor {
    /// Start the event loop on the current tokio runtime.
    ///
    /// Out-of-range settings (a zero read buffer or connect timeout) are
    /// replaced by their defaults, with a warning.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(config: &ConnectionConfig) -> Self {
        let config = sanitize_connection(config);
        let (tx, rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop {
            rx,
            events: tx.downgrade(),
            read_buffer_size: config.read_buffer_size,
            entries: HashMap::new(),
        };
        tokio::spawn(event_loop.run());

        tracing::debug!(
            read_buffer_size = config.read_buffer_size,
            connect_timeout_ms = config.connect_timeout_ms,
            "Reactor started"
        );

        Self {
            tx,
            read_buffer_size: config.read_buffer_size,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    /// Run `f` on the reactor task, after everything queued before it.
    pub fn post<F>(&self, f: F) -> Result<(), ConnectionError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Message::Dispatch(Box::new(f)))
    }

    /// Release every registered connection without notifying and stop the loop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    /// Whether the event loop is still accepting work.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Capacity of each connection's read buffer, in bytes.
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// Upper bound on a single outbound connection attempt.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub(crate) fn send(&self, message: Message) -> Result<(), ConnectionError> {
        self.tx
            .send(message)
            .map_err(|_| ConnectionError::ReactorStopped)
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("running", &self.is_running())
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}

/// Scheduling state of one stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Unscheduled,
    Scheduled,
    Open,
}

/// Registration table row for one connection.
struct Entry {
    handle: Weak<Shared>,
    closed: Arc<AtomicBool>,
    listener: Weak<ConnectionListener>,
    /// Present until `open` hands the streams to their I/O tasks.
    streams: Option<(InputStream, OutputStream)>,
    input: StreamState,
    output: StreamState,
    writer: Option<mpsc::UnboundedSender<Bytes>>,
    /// Sends issued before the output stream was scheduled.
    pending: VecDeque<Bytes>,
    tasks: Vec<JoinHandle<()>>,
}

impl Entry {
    fn state(&self, direction: StreamDirection) -> StreamState {
        match direction {
            StreamDirection::Input => self.input,
            StreamDirection::Output => self.output,
        }
    }

    fn set_state(&mut self, direction: StreamDirection, state: StreamState) {
        match direction {
            StreamDirection::Input => self.input = state,
            StreamDirection::Output => self.output = state,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A handle to pass to callbacks, while any caller still holds one.
    fn connection(&self) -> Option<Connection> {
        self.handle.upgrade().map(Connection::from_shared)
    }

    /// Invoke a listener slot with a live handle, if both still exist.
    fn notify(&self, event: &'static str, f: impl FnOnce(&ConnectionListener, &Connection)) {
        if let Some(connection) = self.connection() {
            self.notify_via(&connection, event, f);
        }
    }

    fn notify_via(
        &self,
        connection: &Connection,
        event: &'static str,
        f: impl FnOnce(&ConnectionListener, &Connection),
    ) {
        if let Some(listener) = live(&self.listener, event) {
            f(&listener, connection);
        }
    }
}

/// Who, if anyone, hears about a teardown.
enum Notify {
    /// Release without callbacks.
    Silent,
    /// Notify through a handle some caller still holds.
    Live,
    /// Notify through the handle that requested the close.
    Via(Connection),
}

struct EventLoop {
    rx: mpsc::UnboundedReceiver<Message>,
    /// Weak so the loop ends once no handle, connection or I/O task remains.
    events: mpsc::WeakUnboundedSender<Message>,
    read_buffer_size: usize,
    entries: HashMap<ConnectionId, Entry>,
}

impl EventLoop {
    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            if let Message::Shutdown = message {
                let ids: Vec<ConnectionId> = self.entries.keys().copied().collect();
                for id in ids {
                    self.teardown(id, StreamDirection::Input, Notify::Silent);
                }
                break;
            }
            self.handle(message);
        }
        tracing::debug!("Reactor stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Register {
                id,
                handle,
                closed,
                input,
                output,
            } => {
                self.entries.insert(
                    id,
                    Entry {
                        handle,
                        closed,
                        listener: Weak::new(),
                        streams: Some((input, output)),
                        input: StreamState::Unscheduled,
                        output: StreamState::Unscheduled,
                        writer: None,
                        pending: VecDeque::new(),
                        tasks: Vec::new(),
                    },
                );
                tracing::trace!(connection_id = %id, registered = self.entries.len(), "Connection registered");
            }
            Message::SetListener { id, listener } => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.listener = listener;
                }
            }
            Message::Open(id) => self.open(id),
            Message::Send { id, data } => self.enqueue(id, data),
            Message::Close { id, first, handle } => {
                self.teardown(id, first, Notify::Via(handle))
            }
            Message::Release(id) => self.teardown(id, StreamDirection::Input, Notify::Silent),
            Message::Dispatch(f) => f(),
            Message::Io { id, event } => self.io_event(id, event),
            Message::Shutdown => {}
        }
    }

    fn open(&mut self, id: ConnectionId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            tracing::trace!(connection_id = %id, "Open ignored for unknown connection");
            return;
        };
        if entry.is_closed() {
            return;
        }
        let Some((input, output)) = entry.streams.take() else {
            tracing::trace!(connection_id = %id, "Connection already open");
            return;
        };
        // The loop itself holds a receiver, so the channel is open while it runs.
        let Some(events) = self.events.upgrade() else {
            return;
        };

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        for data in entry.pending.drain(..) {
            let _ = writer_tx.send(data);
        }

        entry.tasks.push(tokio::spawn(connection::read_stream(
            id,
            input,
            self.read_buffer_size,
            events.clone(),
        )));
        entry
            .tasks
            .push(tokio::spawn(connection::write_stream(id, output, writer_rx, events)));
        entry.writer = Some(writer_tx);
        entry.input = StreamState::Scheduled;
        entry.output = StreamState::Scheduled;

        tracing::debug!(connection_id = %id, "Connection scheduled");
    }

    fn enqueue(&mut self, id: ConnectionId, data: Bytes) {
        let Some(entry) = self.entries.get_mut(&id) else {
            tracing::trace!(connection_id = %id, bytes = data.len(), "Send dropped for closed connection");
            return;
        };
        if entry.is_closed() {
            return;
        }
        match &entry.writer {
            Some(writer) => {
                let _ = writer.send(data);
            }
            None => entry.pending.push_back(data),
        }
    }

    fn io_event(&mut self, id: ConnectionId, event: IoEvent) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        if entry.is_closed() {
            return;
        }

        match event {
            IoEvent::Opened(direction) => {
                if entry.state(direction) != StreamState::Scheduled {
                    return;
                }
                entry.set_state(direction, StreamState::Open);
                tracing::trace!(connection_id = %id, %direction, "Stream opened");
                entry.notify("stream_opened", |listener, connection| {
                    listener.stream_opened(connection, direction)
                });
            }
            IoEvent::Data(data) => {
                tracing::trace!(connection_id = %id, bytes = data.len(), "Data received");
                entry.notify("data", |listener, connection| listener.data(connection, data));
            }
            IoEvent::Written(completion) => {
                if let Some(error) = &completion.error {
                    tracing::warn!(connection_id = %id, bytes = completion.bytes, error = %error, "Write failed");
                }
                entry.notify("write", |listener, connection| {
                    listener.write(connection, completion)
                });
            }
            IoEvent::Ended(direction) => {
                tracing::debug!(connection_id = %id, %direction, "End of stream");
                self.teardown(id, direction, Notify::Live);
            }
            IoEvent::Failed(direction, error) => {
                tracing::warn!(connection_id = %id, %direction, error = %error, "Stream error");
                self.teardown(id, direction, Notify::Live);
            }
        }
    }

    /// Close both directions, starting with `first`. Half-open connections are
    /// not supported, so any single-stream closure lands here.
    fn teardown(&mut self, id: ConnectionId, first: StreamDirection, notify: Notify) {
        let Some(mut entry) = self.entries.remove(&id) else {
            return;
        };
        entry.closed.store(true, Ordering::Release);
        for task in entry.tasks.drain(..) {
            task.abort();
        }
        entry.writer = None;
        entry.streams = None;
        let discarded = entry.pending.len();
        entry.pending.clear();

        let connection = match notify {
            Notify::Silent => None,
            Notify::Live => entry.connection(),
            Notify::Via(connection) => Some(connection),
        };
        let notified = connection.is_some();
        if let Some(connection) = connection {
            for direction in [first, first.opposite()] {
                if entry.state(direction) == StreamState::Open {
                    entry.notify_via(&connection, "stream_closed", |listener, connection| {
                        listener.stream_closed(connection, direction)
                    });
                }
            }
        }

        tracing::debug!(
            connection_id = %id,
            notified,
            discarded,
            registered = self.entries.len(),
            "Connection closed"
        );
    }
}
