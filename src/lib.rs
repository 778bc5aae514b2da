//! Peer-to-peer local-network chat: connection and socket lifecycle core.
//!
//! # Architecture Overview
//!
//! ```text
//!   discovery (publish / browse)
//!        │ resolved endpoint
//!        ▼
//!   ┌──────────────┐        ┌──────────────┐
//!   │ ClientSocket │        │ ServerSocket │◀── inbound TCP (IPv4 + IPv6)
//!   └──────┬───────┘        └──────┬───────┘
//!          │   unopened Connection │
//!          └───────────┬───────────┘
//!                      ▼
//!              ┌──────────────┐  read/write tasks
//!              │  Connection  │◀─────────────────── byte streams
//!              └──────┬───────┘
//!                     ▼
//!              ┌──────────────┐
//!              │   Reactor    │── listener callbacks (one task)
//!              └──────────────┘
//! ```
//!
//! Message framing, text encoding and presence are left to the application
//! layer consuming the `on_data` chunks.

pub mod config;
pub mod discovery;
pub mod error;
pub mod net;
pub mod observability;

pub use config::ChatConfig;
pub use error::{ConnectionError, DiscoveryError, SocketError, WriteError};
pub use net::{
    ClientListener, ClientSocket, Connection, ConnectionListener, Endpoint, Reactor,
    ServerListener, ServerSocket, StreamDirection, WriteCompletion,
};
