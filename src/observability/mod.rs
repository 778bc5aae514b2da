//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! reactor, sockets, I/O tasks
//!     → tracing events with structured fields
//!       (connection_id, direction, family, peer_addr, bytes)
//!     → logging.rs subscriber (env filter + fmt layer)
//!     → stdout
//! ```

pub mod logging;

pub use logging::init_logging;
