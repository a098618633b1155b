#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! # HeliX Relay
//!
//! An in-memory WebSocket relay for end-to-end encrypted chat and file transfer.
//!
//! Clients register a short identifier and exchange envelopes addressed to each
//! other. The relay validates envelope structure, throttles abuse and forwards
//! frames byte-for-byte; it never sees plaintext or keys.

/// Server configuration and environment overrides
pub mod config;

/// Structured logging configuration
pub mod logging;

/// Relay counters
pub mod metrics;

/// Envelope types, identifier grammar and validation
pub mod protocol;

/// Sliding-window rate limiting
pub mod rate_limit;

/// TLS utilities
pub mod security;

/// Registry, sessions, routing and per-connection supervision
pub mod server;

/// WebSocket transport and HTTP endpoints
pub mod websocket;
