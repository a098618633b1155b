#![cfg(feature = "tls")]

use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use rustls::ServerConfig as RustlsServerConfig;
use rustls_pemfile::{certs, private_key};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::TlsServerConfig;

/// Build an [`axum_server`] TLS configuration from the certificate and key paths.
pub fn build_rustls_config(tls: &TlsServerConfig) -> Result<RustlsConfig> {
    let server = Arc::new(build_server_config(tls)?);
    Ok(RustlsConfig::from_config(server))
}

fn build_server_config(tls: &TlsServerConfig) -> Result<RustlsServerConfig> {
    let cert_chain = load_cert_chain(tls)?;
    let private_key = load_private_key(tls)?;

    let mut config = RustlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|err| anyhow!("invalid TLS certificate/private key pair: {err}"))?;

    // WebSocket upgrades need HTTP/1.1; keep h2 for the plain HTTP endpoints.
    config.alpn_protocols = vec![b"http/1.1".to_vec(), b"h2".to_vec()];

    Ok(config)
}

/// Read the PEM file configured for `field`.
fn read_pem(path: Option<&str>, field: &str) -> Result<Vec<u8>> {
    let path = path
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("security.transport.tls.{field} must be set"))?;
    fs::read(path).with_context(|| format!("failed to read {field} at {path}"))
}

fn load_cert_chain(tls: &TlsServerConfig) -> Result<Vec<CertificateDer<'static>>> {
    let pem = read_pem(tls.certificate_path.as_deref(), "certificate_path")?;
    let chain = certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .context("certificate_path does not contain valid PEM certificates")?;

    if chain.is_empty() {
        bail!("certificate_path contains no certificates");
    }
    Ok(chain)
}

/// First PKCS#8, PKCS#1 or SEC1 key in the file.
fn load_private_key(tls: &TlsServerConfig) -> Result<PrivateKeyDer<'static>> {
    let pem = read_pem(tls.private_key_path.as_deref(), "private_key_path")?;
    private_key(&mut pem.as_slice())
        .context("private_key_path does not contain valid PEM")?
        .ok_or_else(|| anyhow!("private_key_path contains no pkcs8, pkcs1 or sec1 key"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls_with(cert: &std::path::Path, key: &std::path::Path) -> TlsServerConfig {
        TlsServerConfig {
            enabled: true,
            certificate_path: Some(cert.display().to_string()),
            private_key_path: Some(key.display().to_string()),
        }
    }

    #[test]
    fn missing_paths_are_errors() {
        let tls = TlsServerConfig {
            enabled: true,
            certificate_path: None,
            private_key_path: None,
        };
        let err = build_server_config(&tls).unwrap_err();
        assert!(err.to_string().contains("certificate_path"));
    }

    #[test]
    fn empty_pem_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();

        let err = build_server_config(&tls_with(&cert, &key)).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }
}
