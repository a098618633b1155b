//! Abuse throttling configuration.

use super::defaults::{
    default_connection_window_secs, default_ip_cleanup_interval_secs,
    default_max_connections_per_ip, default_max_messages_per_connection,
    default_message_window_secs,
};
use serde::{Deserialize, Serialize};

/// Sliding-window limits for connection attempts and inbound messages.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    /// Maximum connection attempts per IP within `connection_window_secs`
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: usize,
    /// Window for the per-IP connection limiter (seconds)
    #[serde(default = "default_connection_window_secs")]
    pub connection_window_secs: u64,
    /// Maximum inbound frames per connection within `message_window_secs`
    #[serde(default = "default_max_messages_per_connection")]
    pub max_messages_per_connection: usize,
    /// Window for the per-connection message limiter (seconds)
    #[serde(default = "default_message_window_secs")]
    pub message_window_secs: u64,
    /// Interval between sweeps that drop aged-out per-IP windows (seconds)
    #[serde(default = "default_ip_cleanup_interval_secs")]
    pub ip_cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_connections_per_ip: default_max_connections_per_ip(),
            connection_window_secs: default_connection_window_secs(),
            max_messages_per_connection: default_max_messages_per_connection(),
            message_window_secs: default_message_window_secs(),
            ip_cleanup_interval_secs: default_ip_cleanup_interval_secs(),
        }
    }
}
