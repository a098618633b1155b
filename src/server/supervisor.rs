//! Per-connection lifecycle.
//!
//! ```text
//! accept ──rate ok──▶ Unregistered ──valid type 0──▶ Registered(id)
//!    │                     │                               │
//!    └─rate exceeded─▶ rejected       rate exceeded / transport closed
//!                          │                               │
//!                          └────────────▶ Closed ◀─────────┘
//! ```
//!
//! Cleanup runs exactly once per accepted connection. The transport loop
//! always calls [`ConnectionSupervisor::close`], which releases the identifier
//! before it returns. A supervisor dropped without closing (a panicking or
//! cancelled owner) falls back to a task spawned by its `Drop`; until that task
//! runs the identifier is still registered.

use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{ConnectionId, InboundMessage, MessageType, ServerMessage, ValidationError};

use super::{ClientHandle, OutboundFrame, RelayServer, POLICY_VIOLATION};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRejected {
    #[error("connection rate limit exceeded for {ip}")]
    RateLimited { ip: IpAddr },
}

impl ConnectionRejected {
    pub const CLOSE_REASON: &'static str = "Connection rate limit exceeded";

    pub const fn close_code(&self) -> u16 {
        POLICY_VIOLATION
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unregistered,
    Registered(String),
    Closed,
}

/// What the transport should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Close,
}

pub struct ConnectionSupervisor {
    server: Arc<RelayServer>,
    handle: ClientHandle,
    state: ConnectionState,
}

impl ConnectionSupervisor {
    pub const MESSAGE_RATE_CLOSE_REASON: &'static str = "Message rate limit exceeded";

    /// Admit a new transport from `ip`. Runs the per-IP limiter before
    /// anything else; a refused connection never touches the registry.
    pub fn accept(
        server: Arc<RelayServer>,
        ip: IpAddr,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Result<Self, ConnectionRejected> {
        if !server.rate_limiter().allow_connection(ip) {
            server.metrics().increment_connections_rejected();
            return Err(ConnectionRejected::RateLimited { ip });
        }

        let handle = ClientHandle::new(ip, sender);
        server.metrics().increment_connections();
        info!(connection_id = %handle.id(), client_ip = %ip, "Connection accepted");

        Ok(Self {
            server,
            handle,
            state: ConnectionState::Unregistered,
        })
    }

    pub const fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub const fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    pub fn identifier(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Registered(identifier) => Some(identifier),
            _ => None,
        }
    }

    /// Process one inbound text frame.
    pub async fn handle_frame(&mut self, raw: &str) -> FrameOutcome {
        if self.state == ConnectionState::Closed {
            return FrameOutcome::Close;
        }

        self.server.metrics().increment_frames_received();

        if self.enforce_message_rate().await == FrameOutcome::Close {
            return FrameOutcome::Close;
        }

        let metrics = self.server.metrics();

        let validated = self.server.validator().validate(raw, self.identifier());
        match validated {
            Ok(InboundMessage::Register { identifier }) => {
                self.log_frame(MessageType::Register, raw);
                self.register(identifier).await;
            }
            Ok(InboundMessage::Relay(envelope)) => {
                self.log_frame(envelope.message_type, raw);
                let ConnectionState::Registered(sender_id) = &self.state else {
                    metrics.increment_unregistered_frames_dropped();
                    warn!(
                        connection_id = %self.id(),
                        message_type = %envelope.message_type,
                        "Discarding frame from unregistered connection"
                    );
                    return FrameOutcome::Continue;
                };
                self.server
                    .route(&self.handle, sender_id, &envelope, raw)
                    .await;
            }
            Err(ValidationError::InvalidIdentifier { identifier }) => {
                metrics.increment_validation_errors();
                metrics.increment_registration_failures();
                warn!(connection_id = %self.id(), ?identifier, "Invalid identifier in registration");
                let failure = super::RegistrationError::InvalidFormat;
                self.server
                    .reply(
                        &self.handle,
                        ServerMessage::RegistrationFailed {
                            identifier,
                            reason: failure.reason(),
                            error: failure.to_string(),
                        },
                    )
                    .await;
            }
            Err(ValidationError::FileTooLarge {
                target_id,
                transfer_id,
                size,
                max,
            }) => {
                metrics.increment_file_transfers_refused();
                let Some(sender_id) = self.identifier() else {
                    warn!(connection_id = %self.id(), "Discarding oversized transfer from unregistered connection");
                    return FrameOutcome::Continue;
                };
                warn!(
                    sender = %sender_id,
                    target = %target_id,
                    size,
                    max,
                    "Refusing file transfer above size limit"
                );
                let message = ServerMessage::FileTransferError {
                    target_id: sender_id.to_string(),
                    sender_id: target_id,
                    transfer_id,
                    error: format!("File size {size} bytes exceeds the maximum of {max} bytes."),
                };
                self.server.reply(&self.handle, message).await;
            }
            Err(err) => {
                metrics.increment_validation_errors();
                warn!(connection_id = %self.id(), kind = err.kind(), error = %err, "Rejected frame");
            }
        }

        FrameOutcome::Continue
    }

    /// Process one inbound binary frame. The relay only speaks text, so the
    /// payload is discarded, but the frame still counts against the message
    /// limit.
    pub async fn handle_binary(&mut self, len: usize) -> FrameOutcome {
        if self.state == ConnectionState::Closed {
            return FrameOutcome::Close;
        }

        if self.enforce_message_rate().await == FrameOutcome::Close {
            return FrameOutcome::Close;
        }

        self.server.metrics().increment_binary_frames_ignored();
        warn!(connection_id = %self.id(), bytes = len, "Ignoring binary frame");
        FrameOutcome::Continue
    }

    /// Charge one frame to this connection's message window. Over the limit,
    /// the client gets `-2` followed by a policy close and state is released.
    async fn enforce_message_rate(&mut self) -> FrameOutcome {
        if self.server.rate_limiter().allow_message(self.id()) {
            return FrameOutcome::Continue;
        }

        self.server.metrics().increment_message_rate_limited();
        self.server.reply(&self.handle, ServerMessage::RateLimited).await;
        let _ = self
            .handle
            .send(OutboundFrame::Close {
                code: POLICY_VIOLATION,
                reason: Self::MESSAGE_RATE_CLOSE_REASON,
            })
            .await;
        self.close().await;
        FrameOutcome::Close
    }

    async fn register(&mut self, identifier: String) {
        let metrics = self.server.metrics();
        match self.server.registry().register(&self.handle, &identifier).await {
            Ok(()) => {
                metrics.increment_registrations();
                self.state = ConnectionState::Registered(identifier.clone());
                self.server
                    .reply(&self.handle, ServerMessage::Registered { identifier })
                    .await;
            }
            Err(err) => {
                metrics.increment_registration_failures();
                warn!(connection_id = %self.id(), %identifier, reason = err.reason().as_str(), "Registration refused");
                self.server
                    .reply(
                        &self.handle,
                        ServerMessage::RegistrationFailed {
                            identifier: Some(identifier),
                            reason: err.reason(),
                            error: err.to_string(),
                        },
                    )
                    .await;
            }
        }
    }

    fn log_frame(&self, message_type: MessageType, raw: &str) {
        if !self.server.config().debug {
            return;
        }
        if message_type == MessageType::FileChunk {
            debug!(connection_id = %self.id(), %message_type, bytes = raw.len(), "Received frame (chunk data omitted)");
        } else {
            debug!(connection_id = %self.id(), %message_type, frame = %raw, "Received frame");
        }
    }

    /// Tear down this connection's relay state. Idempotent.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        release(&self.server, self.handle.id()).await;
    }
}

/// Fallback for owners that never reach [`ConnectionSupervisor::close`].
/// Release is deferred to a spawned task, so the identifier is not free for
/// re-registration until the runtime polls it.
impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        let server = Arc::clone(&self.server);
        let connection_id = self.handle.id();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { release(&server, connection_id).await });
        } else {
            warn!(%connection_id, "Connection dropped outside a runtime; relay state not released");
        }
    }
}

/// The pairing is popped and the peer resolved while the identifier is still
/// held, so a successor claiming the freed name starts without a session.
async fn release(server: &RelayServer, connection_id: ConnectionId) {
    server.rate_limiter().forget_connection(connection_id);
    server.metrics().decrement_active_connections();

    let Some(identifier) = server.registry().identifier_of(connection_id).await else {
        info!(%connection_id, "Connection closed");
        return;
    };

    let ended = match server.sessions().on_disconnect(&identifier).await {
        Some(peer_id) => {
            server.metrics().increment_sessions_ended();
            let peer = server.registry().lookup(&peer_id).await;
            Some((peer_id, peer))
        }
        None => None,
    };

    server.registry().unregister(connection_id).await;

    match ended {
        Some((peer_id, Some(peer))) => server.notify_session_end(peer, peer_id, identifier),
        Some((peer_id, None)) => debug!(%identifier, peer = %peer_id, "Session peer already gone"),
        None => {}
    }
    info!(%connection_id, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use serde_json::{json, Value};
    use std::net::Ipv4Addr;

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn connect(server: &Arc<RelayServer>) -> (ConnectionSupervisor, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = server.outbound_channel();
        let supervisor = ConnectionSupervisor::accept(Arc::clone(server), IP, tx).unwrap();
        (supervisor, rx)
    }

    fn next_json(rx: &mut mpsc::Receiver<OutboundFrame>) -> Value {
        match rx.try_recv() {
            Ok(OutboundFrame::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn registration_moves_to_registered() {
        let server = RelayServer::new(ServerConfig::default());
        let (mut alice, mut rx) = connect(&server);
        assert_eq!(alice.state(), &ConnectionState::Unregistered);

        let outcome = alice
            .handle_frame(&json!({"type": 0, "payload": {"identifier": "alice"}}).to_string())
            .await;
        assert_eq!(outcome, FrameOutcome::Continue);
        assert_eq!(alice.state(), &ConnectionState::Registered("alice".into()));
        assert_eq!(next_json(&mut rx)["type"], json!(0.1));
    }

    #[tokio::test]
    async fn invalid_identifier_gets_invalid_format() {
        let server = RelayServer::new(ServerConfig::default());
        let (mut client, mut rx) = connect(&server);
        client
            .handle_frame(&json!({"type": 0, "payload": {"identifier": "x"}}).to_string())
            .await;
        let reply = next_json(&mut rx);
        assert_eq!(reply["type"], json!(0.2));
        assert_eq!(reply["payload"]["reason"], "invalid_format");
        assert_eq!(client.state(), &ConnectionState::Unregistered);
    }

    #[tokio::test]
    async fn unregistered_relay_is_dropped_silently() {
        let server = RelayServer::new(ServerConfig::default());
        let (mut client, mut rx) = connect(&server);
        client
            .handle_frame(&json!({"type": 1, "payload": {"targetId": "bob"}}).to_string())
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_frees_identifier() {
        let server = RelayServer::new(ServerConfig::default());
        let (mut alice, _rx) = connect(&server);
        alice
            .handle_frame(&json!({"type": 0, "payload": {"identifier": "alice"}}).to_string())
            .await;

        alice.close().await;
        alice.close().await;
        assert_eq!(alice.state(), &ConnectionState::Closed);
        assert_eq!(server.registered_count().await, 0);
        assert_eq!(alice.handle_frame("{}").await, FrameOutcome::Close);

        let snapshot = server.metrics().snapshot();
        assert_eq!(snapshot.connections.active_connections, 0);
        assert_eq!(snapshot.connections.disconnections, 1);
    }

    #[tokio::test]
    async fn dropping_without_close_still_releases() {
        let server = RelayServer::new(ServerConfig::default());
        let (mut alice, _rx) = connect(&server);
        alice
            .handle_frame(&json!({"type": 0, "payload": {"identifier": "alice"}}).to_string())
            .await;
        drop(alice);

        for _ in 0..10 {
            if server.registered_count().await == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(server.registered_count().await, 0);
    }

    #[tokio::test]
    async fn binary_frames_count_against_message_limit() {
        let mut config = ServerConfig::default();
        config.max_messages_per_connection = 2;
        let server = RelayServer::new(config);
        let (mut alice, mut rx) = connect(&server);
        alice
            .handle_frame(&json!({"type": 0, "payload": {"identifier": "alice"}}).to_string())
            .await;
        assert_eq!(next_json(&mut rx)["type"], json!(0.1));

        assert_eq!(alice.handle_binary(3).await, FrameOutcome::Continue);
        assert_eq!(alice.handle_binary(3).await, FrameOutcome::Close);

        assert_eq!(next_json(&mut rx)["type"], json!(-2));
        match rx.try_recv() {
            Ok(OutboundFrame::Close { code, reason }) => {
                assert_eq!(code, POLICY_VIOLATION);
                assert_eq!(reason, ConnectionSupervisor::MESSAGE_RATE_CLOSE_REASON);
            }
            other => panic!("expected close frame, got {other:?}"),
        }
        assert_eq!(alice.state(), &ConnectionState::Closed);
        assert_eq!(server.registered_count().await, 0);

        let snapshot = server.metrics().snapshot();
        assert_eq!(snapshot.errors.binary_frames_ignored, 1);
        assert_eq!(snapshot.errors.message_rate_limited, 1);
    }

    #[tokio::test]
    async fn successor_under_freed_identifier_has_no_session() {
        let server = RelayServer::new(ServerConfig::default());
        let (mut alice, _alice_rx) = connect(&server);
        let (mut bob, mut bob_rx) = connect(&server);
        alice
            .handle_frame(&json!({"type": 0, "payload": {"identifier": "alice"}}).to_string())
            .await;
        bob.handle_frame(&json!({"type": 0, "payload": {"identifier": "bob"}}).to_string())
            .await;
        next_json(&mut bob_rx);
        server
            .sessions()
            .on_relay_succeeded(MessageType::SessionAccept, "bob", "alice")
            .await;

        alice.close().await;
        assert_eq!(server.session_peer("bob").await, None);

        let (mut successor, mut successor_rx) = connect(&server);
        successor
            .handle_frame(&json!({"type": 0, "payload": {"identifier": "alice"}}).to_string())
            .await;
        assert_eq!(next_json(&mut successor_rx)["type"], json!(0.1));
        assert_eq!(server.session_peer("alice").await, None);

        let notice = tokio::time::timeout(std::time::Duration::from_secs(1), bob_rx.recv())
            .await
            .expect("bob should be told alice left");
        let text = match notice {
            Some(OutboundFrame::Text(text)) => text,
            other => panic!("expected session end notice, got {other:?}"),
        };
        let notice: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(notice["type"], json!(9));
        assert_eq!(notice["payload"]["senderId"], "alice");
    }

    #[tokio::test]
    async fn connection_limit_rejects_before_registration() {
        let mut config = ServerConfig::default();
        config.max_connections_per_ip = 1;
        let server = RelayServer::new(config);
        let (_first, _rx) = connect(&server);

        let (tx, _rx2) = server.outbound_channel();
        let rejected = ConnectionSupervisor::accept(Arc::clone(&server), IP, tx);
        let Err(err) = rejected else {
            panic!("second connection should be refused");
        };
        assert_eq!(err, ConnectionRejected::RateLimited { ip: IP });
        assert_eq!(err.close_code(), 1008);
        assert_eq!(server.metrics().snapshot().connections.connections_rejected, 1);
    }
}
