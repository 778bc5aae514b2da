//! Network layer subsystem: the connection and socket lifecycle core.
//!
//! # Data Flow
//! ```text
//! discovery resolves a peer
//!     → client.rs (ClientSocket: one outbound attempt)      ┐
//! inbound TCP connection                                    ├→ Connection (unopened)
//!     → listener.rs (ServerSocket: IPv4 + IPv6 accept)      ┘
//!     → delegate opens it
//!     → connection.rs read/write tasks
//!     → reactor.rs (single event loop, listener callbacks)
//!
//! Stream states (per direction):
//!     Unscheduled → Scheduled → Open → Closed
//! ```
//!
//! # Design Decisions
//! - One reactor task delivers every callback, so listeners never race
//! - Any stream closing tears down the whole connection (no half-open)
//! - Listeners are held weakly; a dropped listener just stops observing

pub mod client;
pub mod connection;
pub mod endpoint;
pub mod events;
pub mod listener;
pub mod reactor;

pub use client::ClientSocket;
pub use connection::{Connection, ConnectionId, InputStream, OutputStream};
pub use endpoint::{Endpoint, IpFamily};
pub use events::{
    ClientListener, ConnectionListener, ServerListener, StreamDirection, WriteCompletion,
};
pub use listener::{BindStatus, ServerSocket};
pub use reactor::Reactor;
