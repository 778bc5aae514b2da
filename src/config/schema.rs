//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a chat peer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::discovery::{DEFAULT_DOMAIN, DEFAULT_SERVICE_TYPE};

/// Root configuration for a chat peer.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Listening socket settings.
    pub listener: ListenerConfig,

    /// Per-connection I/O settings.
    pub connection: ConnectionConfig,

    /// Service advertisement settings.
    pub discovery: DiscoveryConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port to bind on both address families (0 = ephemeral).
    pub port: u16,

    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            backlog: 128,
        }
    }
}

/// Connection I/O configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Capacity of the per-connection read buffer, in bytes.
    pub read_buffer_size: usize,

    /// Outbound connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            connect_timeout_ms: 5000,
        }
    }
}

/// Service advertisement configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Instance name advertised for this peer.
    pub service_name: String,

    /// Service type, e.g. `_chat._tcp.`.
    pub service_type: String,

    /// Browsing/publishing domain.
    pub domain: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_name: "chat".to_string(),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
