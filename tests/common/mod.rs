//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bonjour_chat::config::ConnectionConfig;
use bonjour_chat::net::{
    ClientListener, Connection, ConnectionListener, IpFamily, Reactor, ServerListener,
    StreamDirection, WriteCompletion,
};
use bonjour_chat::SocketError;
use bytes::Bytes;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Upper bound for anything the tests wait on.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// How long a channel must stay empty to count as quiet.
pub const QUIET: Duration = Duration::from_millis(200);

/// Everything a connection listener can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened(StreamDirection),
    Closed(StreamDirection),
    Data(Bytes),
    Written(WriteCompletion),
}

/// A listener recording every event into a channel.
pub fn recorder() -> (Arc<ConnectionListener>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (opened, closed, data, written) = (tx.clone(), tx.clone(), tx.clone(), tx);
    let listener = ConnectionListener::new()
        .on_stream_opened(move |_, direction| {
            let _ = opened.send(Event::Opened(direction));
        })
        .on_stream_closed(move |_, direction| {
            let _ = closed.send(Event::Closed(direction));
        })
        .on_data(move |_, bytes| {
            let _ = data.send(Event::Data(bytes));
        })
        .on_write(move |_, completion| {
            let _ = written.send(Event::Written(completion));
        });
    (Arc::new(listener), rx)
}

/// Receive the next item or panic after [`TIMEOUT`].
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Assert nothing arrives for [`QUIET`].
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(item)) = tokio::time::timeout(QUIET, rx.recv()).await {
        panic!("unexpected event: {:?}", item);
    }
}

/// Wait for both open events, in either order.
pub async fn expect_opened(rx: &mut mpsc::UnboundedReceiver<Event>) {
    let mut seen = Vec::new();
    for _ in 0..2 {
        match next(rx).await {
            Event::Opened(direction) => seen.push(direction),
            other => panic!("expected open event, got {:?}", other),
        }
    }
    assert!(seen.contains(&StreamDirection::Input));
    assert!(seen.contains(&StreamDirection::Output));
}

/// Collect data events until `len` bytes have arrived.
pub async fn collect_data(rx: &mut mpsc::UnboundedReceiver<Event>, len: usize) -> Vec<u8> {
    let mut received = Vec::with_capacity(len);
    while received.len() < len {
        match next(rx).await {
            Event::Data(bytes) => received.extend_from_slice(&bytes),
            other => panic!("expected data, got {:?}", other),
        }
    }
    received
}

/// Collect write completions until `len` bytes are accounted for.
pub async fn collect_writes(
    rx: &mut mpsc::UnboundedReceiver<Event>,
    len: usize,
) -> Vec<WriteCompletion> {
    let mut completions = Vec::new();
    let mut total = 0;
    while total < len {
        match next(rx).await {
            Event::Written(completion) => {
                total += completion.bytes;
                completions.push(completion);
            }
            other => panic!("expected write completion, got {:?}", other),
        }
    }
    completions
}

/// A connection over two in-memory pipes, plus the remote ends.
pub struct Pipes {
    pub connection: Connection,
    /// Bytes written here arrive on the connection's input stream.
    pub to_connection: DuplexStream,
    /// Bytes the connection writes arrive here.
    pub from_connection: DuplexStream,
}

pub fn reactor_with_buffer(read_buffer_size: usize) -> Reactor {
    Reactor::spawn(&ConnectionConfig {
        read_buffer_size,
        ..ConnectionConfig::default()
    })
}

pub fn pipes(reactor: &Reactor, capacity: usize) -> Pipes {
    let (input, to_connection) = tokio::io::duplex(capacity);
    let (output, from_connection) = tokio::io::duplex(capacity);
    Pipes {
        connection: Connection::new(reactor, input, output),
        to_connection,
        from_connection,
    }
}

/// Outcome reported by a server or client listener.
#[derive(Debug)]
pub enum SocketEvent {
    Connected(Connection),
    Failed(SocketError),
}

/// A server listener recording accepted connections and bind failures separately.
pub fn server_recorder() -> (
    Arc<ServerListener>,
    mpsc::UnboundedReceiver<SocketEvent>,
    mpsc::UnboundedReceiver<(IpFamily, SocketError)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (failed_tx, failed_rx) = mpsc::unbounded_channel();
    let listener = ServerListener::new()
        .on_connection(move |connection| {
            let _ = tx.send(SocketEvent::Connected(connection));
        })
        .on_bind_failed(move |family, error| {
            let _ = failed_tx.send((family, error));
        });
    (Arc::new(listener), rx, failed_rx)
}

pub fn client_recorder() -> (Arc<ClientListener>, mpsc::UnboundedReceiver<SocketEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let failed = tx.clone();
    let listener = ClientListener::new()
        .on_connection(move |connection| {
            let _ = tx.send(SocketEvent::Connected(connection));
        })
        .on_failure(move |error| {
            let _ = failed.send(SocketEvent::Failed(error));
        });
    (Arc::new(listener), rx)
}

/// Wait for a connection from a socket listener, panicking on failure.
pub async fn expect_connection(rx: &mut mpsc::UnboundedReceiver<SocketEvent>) -> Connection {
    match next(rx).await {
        SocketEvent::Connected(connection) => connection,
        SocketEvent::Failed(error) => panic!("expected connection, got {}", error),
    }
}
