//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ChatConfig (validated, immutable)
//!     → sections handed to Reactor, ServerSocket, discovery, logging
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ChatConfig;
pub use schema::ConnectionConfig;
pub use schema::DiscoveryConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use validation::{sanitize_connection, validate_config, ValidationError};
