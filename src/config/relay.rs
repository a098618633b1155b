//! Relay payload limits and queueing configuration.

use super::defaults::{
    default_max_encrypted_field_len, default_max_file_size_bytes, default_max_message_size,
    default_notify_timeout_ms, default_outbound_queue_capacity,
};
use serde::{Deserialize, Serialize};

/// Limits applied while validating and forwarding envelopes.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    /// Largest `fileSize` a transfer request may announce. `null` disables the cap.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: Option<u64>,
    /// Maximum WebSocket message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Upper bound for `data`, `encryptedChallenge` and `encryptedResponse` fields
    #[serde(default = "default_max_encrypted_field_len")]
    pub max_encrypted_field_len: usize,
    /// Capacity of each connection's outbound frame queue
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// How long a disconnect notification may wait on the peer's queue (milliseconds)
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            max_message_size: default_max_message_size(),
            max_encrypted_field_len: default_max_encrypted_field_len(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}
