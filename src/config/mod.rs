//! Configuration module for the relay.
//!
//! Configuration is a serde tree with compiled-in defaults, merged from JSON
//! files, inline JSON, stdin and `HELIX__*` environment overrides.
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`server`]: Connection and message rate limits
//! - [`relay`]: Payload limits and outbound queueing
//! - [`security`]: TLS settings
//! - [`logging`]: Logging configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod relay;
pub mod security;
pub mod server;
pub mod types;
pub mod validation;

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use relay::RelayConfig;

pub use security::{SecurityConfig, TlsServerConfig, TransportSecurityConfig};

pub use server::RateLimitConfig;

pub use types::Config;

pub use validation::validate_config;
