//! Dual-stack listening socket.
//!
//! # Responsibilities
//! - Bind one IPv4 and one IPv6 listener on the requested port, independently
//! - Accept incoming TCP connections on both
//! - Wrap each accepted stream in an unopened [`Connection`] and hand it over
//!
//! The socket never retains accepted connections; ownership moves to the
//! listener's `on_connection` slot, which decides when to open them.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ListenerConfig;
use crate::error::SocketError;
use crate::net::connection::Connection;
use crate::net::endpoint::IpFamily;
use crate::net::events::{live, ServerListener};
use crate::net::reactor::Reactor;

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Where each address family ended up bound, if at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindStatus {
    pub ipv4: Option<SocketAddr>,
    pub ipv6: Option<SocketAddr>,
}

impl BindStatus {
    /// Bound address for `family`, if it is listening.
    pub fn get(&self, family: IpFamily) -> Option<SocketAddr> {
        match family {
            IpFamily::V4 => self.ipv4,
            IpFamily::V6 => self.ipv6,
        }
    }

    fn set(&mut self, family: IpFamily, addr: SocketAddr) {
        match family {
            IpFamily::V4 => self.ipv4 = Some(addr),
            IpFamily::V6 => self.ipv6 = Some(addr),
        }
    }

    /// Whether at least one family is listening.
    pub fn any(&self) -> bool {
        self.ipv4.is_some() || self.ipv6.is_some()
    }
}

/// Accepts inbound connections on one logical port across IPv4 and IPv6.
pub struct ServerSocket {
    status: BindStatus,
    accept_tasks: Vec<JoinHandle<()>>,
}

impl ServerSocket {
    /// Bind both families on `port` (0 = ephemeral) with default settings.
    pub fn bind(
        reactor: &Reactor,
        port: u16,
        listener: &Arc<ServerListener>,
    ) -> Result<Self, SocketError> {
        let config = ListenerConfig {
            port,
            ..ListenerConfig::default()
        };
        Self::bind_with_config(reactor, &config, listener)
    }

    /// Bind both families and start accepting.
    ///
    /// A family that fails to bind is reported once to the listener's
    /// `on_bind_failed` slot; the other family keeps listening. Only when
    /// neither binds does this return [`SocketError::NoListeners`].
    pub fn bind_with_config(
        reactor: &Reactor,
        config: &ListenerConfig,
        listener: &Arc<ServerListener>,
    ) -> Result<Self, SocketError> {
        let mut status = BindStatus::default();
        let mut accept_tasks = Vec::new();

        for family in [IpFamily::V4, IpFamily::V6] {
            let bound = bind_family(family, config.port, config.backlog)
                .and_then(|tcp| tcp.local_addr().map(|addr| (tcp, addr)));

            match bound {
                Ok((tcp, local_addr)) => {
                    tracing::info!(%family, address = %local_addr, backlog = config.backlog, "Listener bound");
                    status.set(family, local_addr);
                    accept_tasks.push(tokio::spawn(accept_loop(
                        tcp,
                        family,
                        reactor.clone(),
                        Arc::downgrade(listener),
                    )));
                }
                Err(source) => {
                    let error = SocketError::Bind {
                        family,
                        port: config.port,
                        source,
                    };
                    tracing::warn!(%family, error = %error, "Listener bind failed");
                    let delegate = Arc::downgrade(listener);
                    let _ = reactor.post(move || {
                        if let Some(delegate) = live(&delegate, "bind_failed") {
                            delegate.bind_failed(family, error);
                        }
                    });
                }
            }
        }

        if !status.any() {
            return Err(SocketError::NoListeners { port: config.port });
        }

        Ok(Self {
            status,
            accept_tasks,
        })
    }

    /// Actual IPv4 port, if IPv4 is listening.
    pub fn port(&self) -> Option<u16> {
        self.status.ipv4.map(|addr| addr.port())
    }

    /// Actual IPv6 port, if IPv6 is listening. May differ from [`port`](Self::port).
    pub fn ipv6_port(&self) -> Option<u16> {
        self.status.ipv6.map(|addr| addr.port())
    }

    /// Bind result for both families.
    pub fn status(&self) -> BindStatus {
        self.status
    }

    /// Stop accepting and close both listening sockets. Connections already
    /// handed over are unaffected.
    pub fn close(&mut self) {
        if self.accept_tasks.is_empty() {
            return;
        }
        for task in self.accept_tasks.drain(..) {
            task.abort();
        }
        tracing::info!(
            ipv4 = ?self.status.ipv4,
            ipv6 = ?self.status.ipv6,
            "Listener closed"
        );
    }

    /// Whether the accept loops are still running.
    pub fn is_listening(&self) -> bool {
        !self.accept_tasks.is_empty()
    }
}

impl Drop for ServerSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSocket")
            .field("status", &self.status)
            .field("listening", &self.is_listening())
            .finish()
    }
}

fn bind_family(family: IpFamily, port: u16, backlog: u32) -> io::Result<TcpListener> {
    let (domain, addr) = match family {
        IpFamily::V4 => (Domain::IPV4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))),
        IpFamily::V6 => (Domain::IPV6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))),
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if family == IpFamily::V6 {
        // Keep the two families independent so both can own the same port.
        socket.set_only_v6(true)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    TcpListener::from_std(socket.into())
}

async fn accept_loop(
    listener: TcpListener,
    family: IpFamily,
    reactor: Reactor,
    delegate: Weak<ServerListener>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%peer_addr, error = %e, "Failed to set TCP_NODELAY");
                }
                let connection = Connection::from_tcp(&reactor, stream);
                tracing::debug!(
                    %family,
                    %peer_addr,
                    connection_id = %connection.id(),
                    "Connection accepted"
                );

                let delegate = delegate.clone();
                let posted = reactor.post(move || {
                    if let Some(delegate) = live(&delegate, "connection") {
                        delegate.connection_created(connection);
                    }
                });
                if posted.is_err() {
                    tracing::warn!(%family, "Reactor stopped, accept loop exiting");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(%family, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_status_lookup() {
        let mut status = BindStatus::default();
        assert!(!status.any());

        let v4: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        status.set(IpFamily::V4, v4);
        assert!(status.any());
        assert_eq!(status.get(IpFamily::V4), Some(v4));
        assert_eq!(status.get(IpFamily::V6), None);
    }

    #[tokio::test]
    async fn ipv4_family_binds_ephemeral_port() {
        let listener = bind_family(IpFamily::V4, 0, 16).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.is_ipv4());
        assert_ne!(addr.port(), 0);
    }
}
