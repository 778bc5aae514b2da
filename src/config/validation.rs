//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer sizes, timeouts, backlog)
//! - Check service type and domain shape
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ChatConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::{ChatConfig, ConnectionConfig};

/// Largest read buffer a connection may allocate.
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("connection.read_buffer_size must be between 1 and {max}, got {got}")]
    ReadBufferSize { got: usize, max: usize },
    #[error("connection.connect_timeout_ms must be greater than zero")]
    ConnectTimeout,
    #[error("listener.backlog must be greater than zero")]
    Backlog,
    #[error("discovery.service_name must not be empty")]
    ServiceName,
    #[error("discovery.service_type {0:?} is not of the form _name._tcp. or _name._udp.")]
    ServiceType(String),
    #[error("discovery.domain must not be empty")]
    Domain,
    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    LogLevel(String),
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &ChatConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let buffer = config.connection.read_buffer_size;
    if buffer == 0 || buffer > MAX_READ_BUFFER_SIZE {
        errors.push(ValidationError::ReadBufferSize {
            got: buffer,
            max: MAX_READ_BUFFER_SIZE,
        });
    }
    if config.connection.connect_timeout_ms == 0 {
        errors.push(ValidationError::ConnectTimeout);
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::Backlog);
    }
    if config.discovery.service_name.trim().is_empty() {
        errors.push(ValidationError::ServiceName);
    }
    if !is_service_type(&config.discovery.service_type) {
        errors.push(ValidationError::ServiceType(
            config.discovery.service_type.clone(),
        ));
    }
    if config.discovery.domain.trim().is_empty() {
        errors.push(ValidationError::Domain);
    }
    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Bring connection settings into range for code paths that skip
/// [`validate_config`]. A zero value falls back to its default and an
/// oversized read buffer is capped; each adjustment is logged.
pub fn sanitize_connection(config: &ConnectionConfig) -> ConnectionConfig {
    let defaults = ConnectionConfig::default();
    let mut sanitized = config.clone();

    if config.read_buffer_size == 0 {
        tracing::warn!(
            default = defaults.read_buffer_size,
            "connection.read_buffer_size is zero, using default"
        );
        sanitized.read_buffer_size = defaults.read_buffer_size;
    } else if config.read_buffer_size > MAX_READ_BUFFER_SIZE {
        tracing::warn!(
            got = config.read_buffer_size,
            max = MAX_READ_BUFFER_SIZE,
            "connection.read_buffer_size too large, capping"
        );
        sanitized.read_buffer_size = MAX_READ_BUFFER_SIZE;
    }
    if config.connect_timeout_ms == 0 {
        tracing::warn!(
            default = defaults.connect_timeout_ms,
            "connection.connect_timeout_ms is zero, using default"
        );
        sanitized.connect_timeout_ms = defaults.connect_timeout_ms;
    }

    sanitized
}

/// `_chat._tcp.` style: an underscore-prefixed name followed by a transport label.
fn is_service_type(value: &str) -> bool {
    let trimmed = value.strip_suffix('.').unwrap_or(value);
    let Some((name, transport)) = trimmed.rsplit_once('.') else {
        return false;
    };
    let name_ok = name.len() > 1
        && name.starts_with('_')
        && name[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    name_ok && (transport == "_tcp" || transport == "_udp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ChatConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ChatConfig::default();
        config.connection.read_buffer_size = 0;
        config.connection.connect_timeout_ms = 0;
        config.discovery.service_type = "chat".into();
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ConnectTimeout));
        assert!(errors.contains(&ValidationError::LogLevel("loud".into())));
    }

    #[test]
    fn out_of_range_connection_settings_are_repaired() {
        let zero = ConnectionConfig {
            read_buffer_size: 0,
            connect_timeout_ms: 0,
        };
        assert_eq!(sanitize_connection(&zero), ConnectionConfig::default());

        let huge = ConnectionConfig {
            read_buffer_size: MAX_READ_BUFFER_SIZE * 4,
            connect_timeout_ms: 250,
        };
        let sanitized = sanitize_connection(&huge);
        assert_eq!(sanitized.read_buffer_size, MAX_READ_BUFFER_SIZE);
        assert_eq!(sanitized.connect_timeout_ms, 250);

        let valid = ConnectionConfig::default();
        assert_eq!(sanitize_connection(&valid), valid);
    }

    #[test]
    fn service_type_shapes() {
        assert!(is_service_type("_chat._tcp."));
        assert!(is_service_type("_chat._tcp"));
        assert!(is_service_type("_my-chat._udp."));
        assert!(!is_service_type("_chat"));
        assert!(!is_service_type("chat._tcp."));
        assert!(!is_service_type("_._tcp."));
        assert!(!is_service_type("_chat._sctp."));
    }
}
