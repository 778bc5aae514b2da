//! Service advertisement and discovery, as seen by the connection core.
//!
//! The core only needs resolved endpoints from this layer; the wire protocol
//! used to find peers (multicast DNS or otherwise) lives behind the
//! [`ServicePublisher`] and [`ServiceBrowser`] traits. [`LocalRegistry`] is an
//! in-process implementation for single-host setups and tests.

pub mod registry;
pub mod service;

pub use registry::LocalRegistry;
pub use service::{DiscoveryEvent, ServiceBrowser, ServiceDescriptor, ServicePublisher};

/// Service type advertised by chat peers.
pub const DEFAULT_SERVICE_TYPE: &str = "_chat._tcp.";

/// Domain used when none is given.
pub const DEFAULT_DOMAIN: &str = "local.";
