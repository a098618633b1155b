//! Configuration validation functions.

use super::Config;
use std::path::Path;

/// Bytes reserved for the JSON envelope around the largest encrypted field.
pub const ENVELOPE_OVERHEAD_BYTES: usize = 4 * 1024;

/// Validate limits and transport security before the relay starts.
///
/// A TLS configuration that cannot be satisfied is a hard error: the relay never
/// falls back to plaintext when certificate material is missing.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let limits = &config.rate_limit;
    if limits.max_connections_per_ip == 0 {
        anyhow::bail!("rate_limit.max_connections_per_ip must be greater than zero");
    }
    if limits.connection_window_secs == 0 {
        anyhow::bail!("rate_limit.connection_window_secs must be greater than zero");
    }
    if limits.max_messages_per_connection == 0 {
        anyhow::bail!("rate_limit.max_messages_per_connection must be greater than zero");
    }
    if limits.message_window_secs == 0 {
        anyhow::bail!("rate_limit.message_window_secs must be greater than zero");
    }
    if limits.ip_cleanup_interval_secs == 0 {
        anyhow::bail!("rate_limit.ip_cleanup_interval_secs must be greater than zero");
    }

    let relay = &config.relay;
    if relay.outbound_queue_capacity == 0 {
        anyhow::bail!("relay.outbound_queue_capacity must be greater than zero");
    }
    let required_frame = relay
        .max_encrypted_field_len
        .saturating_add(ENVELOPE_OVERHEAD_BYTES);
    if relay.max_message_size < required_frame {
        anyhow::bail!(
            "relay.max_message_size ({}) must be at least relay.max_encrypted_field_len + {} bytes ({})",
            relay.max_message_size,
            ENVELOPE_OVERHEAD_BYTES,
            required_frame
        );
    }

    if config.host.trim().is_empty() {
        anyhow::bail!("host must not be empty");
    }

    validate_tls(config)?;

    Ok(())
}

fn validate_tls(config: &Config) -> anyhow::Result<()> {
    let tls = &config.security.transport.tls;
    if !tls.enabled {
        return Ok(());
    }

    if !cfg!(feature = "tls") {
        anyhow::bail!(
            "security.transport.tls.enabled=true but this binary was built without the `tls` feature"
        );
    }

    let cert_path = tls
        .certificate_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "security.transport.tls.certificate_path must be provided when TLS is enabled"
            )
        })?;
    if !Path::new(cert_path).is_file() {
        anyhow::bail!("TLS certificate file not found at {cert_path}");
    }

    let key_path = tls
        .private_key_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "security.transport.tls.private_key_path must be provided when TLS is enabled"
            )
        })?;
    if !Path::new(key_path).is_file() {
        anyhow::bail!("TLS private key file not found at {key_path}");
    }

    Ok(())
}
