//! Transport security configuration types.

use serde::{Deserialize, Serialize};

/// Security configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SecurityConfig {
    /// Transport-level security configuration
    #[serde(default)]
    pub transport: TransportSecurityConfig,
}

/// Transport-level security configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TransportSecurityConfig {
    #[serde(default)]
    pub tls: TlsServerConfig,
}

/// TLS server configuration.
///
/// When `enabled` is set, both PEM paths must point at readable files. The
/// relay refuses to start otherwise instead of serving plaintext WebSockets.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TlsServerConfig {
    /// Enable TLS termination (wss://) on the relay listener.
    #[serde(default)]
    pub enabled: bool,
    /// Path to the PEM-encoded certificate chain presented to clients.
    #[serde(default)]
    pub certificate_path: Option<String>,
    /// Path to the PEM-encoded private key corresponding to the certificate chain.
    #[serde(default)]
    pub private_key_path: Option<String>,
}
