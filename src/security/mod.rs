/// Transport security for the relay listener.
///
/// TLS support is gated behind the `tls` feature. Without it, a configuration
/// that enables TLS is rejected at startup.
pub mod tls;

#[cfg(feature = "tls")]
pub use tls::build_rustls_config;
