//! Default value functions for configuration fields.
//!
//! These back the `#[serde(default = ...)]` attributes across the configuration
//! tree so that a partial `config.json` always deserializes into a complete
//! [`Config`](super::Config).

use super::logging::LogFormat;

// =============================================================================
// Listener
// =============================================================================

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub const fn default_port() -> u16 {
    5678
}

pub const fn default_debug() -> bool {
    false
}

// =============================================================================
// Rate Limit Defaults
// =============================================================================

pub const fn default_max_connections_per_ip() -> usize {
    10
}

pub const fn default_connection_window_secs() -> u64 {
    60
}

pub const fn default_max_messages_per_connection() -> usize {
    20
}

pub const fn default_message_window_secs() -> u64 {
    5
}

pub const fn default_ip_cleanup_interval_secs() -> u64 {
    60
}

// =============================================================================
// Relay Defaults
// =============================================================================

#[allow(clippy::unnecessary_wraps)]
pub const fn default_max_file_size_bytes() -> Option<u64> {
    Some(100 * 1024 * 1024) // 100 MiB
}

/// Transport frame limit. Must stay above the largest encrypted file chunk
/// plus envelope overhead.
pub const fn default_max_message_size() -> usize {
    300 * 1024
}

pub const fn default_max_encrypted_field_len() -> usize {
    128 * 1024
}

pub const fn default_outbound_queue_capacity() -> usize {
    64
}

pub const fn default_notify_timeout_ms() -> u64 {
    1000
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "relay.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
