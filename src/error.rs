//! Error types for the connection core.
//!
//! Most failures never surface as `Err` values: stream errors close the
//! affected connection and write errors ride on write completions. The types
//! here cover the synchronous rejections and the payloads handed to listeners.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::net::endpoint::{Endpoint, IpFamily};

/// Synchronous rejections from [`Connection`](crate::net::Connection) calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// `send_data` was called with no bytes.
    #[error("refusing to send an empty payload")]
    EmptyPayload,
    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,
    /// The reactor task is no longer running.
    #[error("reactor is not running")]
    ReactorStopped,
}

/// Failures of listening and outbound sockets.
#[derive(Debug, Error)]
pub enum SocketError {
    /// One address family could not be bound.
    #[error("failed to bind {family} listener on port {port}: {source}")]
    Bind {
        family: IpFamily,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Neither address family could be bound.
    #[error("no listening socket could be bound on port {port}")]
    NoListeners { port: u16 },
    /// The outbound connection attempt failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    /// The outbound connection attempt did not complete in time.
    #[error("connection attempt to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },
    /// A client socket already made its single attempt.
    #[error("a connection attempt was already made on this socket")]
    AttemptOutstanding,
    /// A discovered service has no resolved endpoint yet.
    #[error("service {name:?} has not been resolved to an endpoint")]
    Unresolved { name: String },
    /// The reactor task is no longer running.
    #[error("reactor is not running")]
    ReactorStopped,
}

/// A cloneable snapshot of an I/O error raised while writing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("write failed ({kind}): {message}")]
pub struct WriteError {
    pub kind: io::ErrorKind,
    pub message: String,
}

impl WriteError {
    /// Whether the error means the output stream can no longer be written.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::WriteZero
                | io::ErrorKind::UnexpectedEof
        )
    }
}

impl From<&io::Error> for WriteError {
    fn from(err: &io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for WriteError {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}

/// Failures reported by discovery collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Another service with this name is already published.
    #[error("a service named {0:?} is already published")]
    NameConflict(String),
    /// No published service has this name.
    #[error("no service named {0:?} is published")]
    NotPublished(String),
    /// Services must carry an endpoint to be advertised.
    #[error("service {0:?} has no endpoint to advertise")]
    MissingEndpoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipe_is_fatal() {
        let err = WriteError::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(err.is_fatal());
    }

    #[test]
    fn other_errors_are_not_fatal() {
        let err = WriteError::from(io::Error::new(io::ErrorKind::Other, "hiccup"));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("hiccup"));
    }
}
