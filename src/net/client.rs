//! Outbound connection to a resolved peer.
//!
//! A [`ClientSocket`] makes exactly one connection attempt and reports exactly
//! one outcome: a new, unopened [`Connection`] or a [`SocketError`]. Retry
//! policy belongs to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::discovery::ServiceDescriptor;
use crate::error::SocketError;
use crate::net::connection::Connection;
use crate::net::endpoint::Endpoint;
use crate::net::events::{live, ClientListener};
use crate::net::reactor::Reactor;

/// A single outbound connection attempt.
pub struct ClientSocket {
    reactor: Reactor,
    endpoint: Endpoint,
    attempt: Option<Attempt>,
}

/// An attempt in flight. `cancelled` also covers an outcome that was already
/// queued on the reactor when the task was aborted.
struct Attempt {
    task: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl ClientSocket {
    /// Create an unarmed socket targeting `endpoint`.
    pub fn new(reactor: &Reactor, endpoint: Endpoint) -> Self {
        Self {
            reactor: reactor.clone(),
            endpoint,
            attempt: None,
        }
    }

    /// Target a service yielded by discovery.
    pub fn for_service(
        reactor: &Reactor,
        service: &ServiceDescriptor,
    ) -> Result<Self, SocketError> {
        let endpoint = service
            .endpoint
            .clone()
            .ok_or_else(|| SocketError::Unresolved {
                name: service.name.clone(),
            })?;
        Ok(Self::new(reactor, endpoint))
    }

    /// Address this socket connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Target port.
    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    /// Start the attempt. The outcome arrives on the reactor task through
    /// `listener`. Fails with [`SocketError::AttemptOutstanding`] if an attempt
    /// was already made; call [`reset`](Self::reset) to try again.
    pub fn connect(&mut self, listener: &Arc<ClientListener>) -> Result<(), SocketError> {
        if self.attempt.is_some() {
            return Err(SocketError::AttemptOutstanding);
        }
        if !self.reactor.is_running() {
            return Err(SocketError::ReactorStopped);
        }

        tracing::debug!(endpoint = %self.endpoint, "Connecting");
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(attempt(
            self.reactor.clone(),
            self.endpoint.clone(),
            self.reactor.connect_timeout(),
            Arc::downgrade(listener),
            Arc::clone(&cancelled),
        ));
        self.attempt = Some(Attempt { task, cancelled });
        Ok(())
    }

    /// Abort any outstanding attempt, without notification, and re-arm.
    pub fn reset(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.cancelled.store(true, Ordering::Release);
            attempt.task.abort();
        }
    }

    /// Whether an attempt has been started since creation or the last reset.
    pub fn has_attempted(&self) -> bool {
        self.attempt.is_some()
    }
}

impl Drop for ClientSocket {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for ClientSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSocket")
            .field("endpoint", &self.endpoint)
            .field("attempted", &self.has_attempted())
            .finish()
    }
}

async fn attempt(
    reactor: Reactor,
    endpoint: Endpoint,
    timeout: Duration,
    delegate: Weak<ClientListener>,
    cancelled: Arc<AtomicBool>,
) {
    let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    let outcome = match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(endpoint = %endpoint, error = %e, "Failed to set TCP_NODELAY");
            }
            Ok(Connection::from_tcp(&reactor, stream))
        }
        Ok(Err(source)) => Err(SocketError::Connect {
            endpoint: endpoint.clone(),
            source,
        }),
        Err(_) => Err(SocketError::ConnectTimeout {
            endpoint: endpoint.clone(),
            timeout,
        }),
    };

    match &outcome {
        Ok(connection) => {
            tracing::info!(endpoint = %endpoint, connection_id = %connection.id(), "Connected")
        }
        Err(error) => tracing::warn!(endpoint = %endpoint, error = %error, "Connection attempt failed"),
    }

    let _ = reactor.post(move || {
        if cancelled.load(Ordering::Acquire) {
            tracing::debug!("Attempt reset before its outcome was delivered");
            return;
        }
        let Some(delegate) = live(&delegate, "client_outcome") else {
            return;
        };
        match outcome {
            Ok(connection) => delegate.connection_created(connection),
            Err(error) => delegate.connection_failed(error),
        }
    });
}
