use crate::config::Config;
use crate::metrics::RelayMetrics;
use crate::protocol::{ConnectionId, MessageValidator, ServerMessage, ValidationLimits};
use crate::rate_limit::RelayRateLimiter;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;
use uuid::Uuid;

mod registry;
mod router;
mod sessions;
mod supervisor;

pub use registry::{ClientRegistry, RegistrationError};
pub use router::RouteOutcome;
pub use sessions::SessionTracker;
pub use supervisor::{ConnectionRejected, ConnectionState, ConnectionSupervisor, FrameOutcome};

/// WebSocket close code used for both rate-limit disconnects.
pub const POLICY_VIOLATION: u16 = 1008;

/// One frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text written to the socket as-is.
    Text(String),
    /// Close the transport with the given code.
    Close { code: u16, reason: &'static str },
}

impl From<ServerMessage> for OutboundFrame {
    fn from(message: ServerMessage) -> Self {
        Self::Text(message.to_json())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    #[error("outbound queue for connection {0} is closed")]
    QueueClosed(ConnectionId),
}

/// Handle to a live connection: its identity and outbound queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ConnectionId,
    ip: IpAddr,
    sender: mpsc::Sender<OutboundFrame>,
}

impl ClientHandle {
    pub fn new(ip: IpAddr, sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ip,
            sender,
        }
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    pub const fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Queue a frame, waiting for room if the writer is behind.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), RelayError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| RelayError::QueueClosed(self.id))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Runtime settings, resolved from [`Config`] into concrete durations.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_connections_per_ip: usize,
    pub connection_window: Duration,
    pub max_messages_per_connection: usize,
    pub message_window: Duration,
    pub ip_cleanup_interval: Duration,
    pub max_file_size_bytes: Option<u64>,
    pub max_message_size: usize,
    pub max_encrypted_field_len: usize,
    pub outbound_queue_capacity: usize,
    pub notify_timeout: Duration,
    /// Log inbound frames at debug level (chunk data is never logged).
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServerConfig {
    pub fn from_config(config: &Config) -> Self {
        let limits = &config.rate_limit;
        let relay = &config.relay;
        Self {
            max_connections_per_ip: limits.max_connections_per_ip,
            connection_window: Duration::from_secs(limits.connection_window_secs),
            max_messages_per_connection: limits.max_messages_per_connection,
            message_window: Duration::from_secs(limits.message_window_secs),
            ip_cleanup_interval: Duration::from_secs(limits.ip_cleanup_interval_secs.max(1)),
            max_file_size_bytes: relay.max_file_size_bytes,
            max_message_size: relay.max_message_size,
            max_encrypted_field_len: relay.max_encrypted_field_len,
            outbound_queue_capacity: relay.outbound_queue_capacity.max(1),
            notify_timeout: Duration::from_millis(relay.notify_timeout_ms),
            debug: config.debug,
        }
    }
}

/// Shared relay state. Owned by the listener and handed to every connection;
/// there is no process-global state.
pub struct RelayServer {
    config: ServerConfig,
    registry: ClientRegistry,
    sessions: SessionTracker,
    rate_limiter: Arc<RelayRateLimiter>,
    validator: MessageValidator,
    metrics: Arc<RelayMetrics>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub registered_clients: usize,
    pub active_sessions: usize,
    pub tracked_ips: usize,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let rate_limiter = Arc::new(RelayRateLimiter::new(
            config.max_connections_per_ip,
            config.connection_window,
            config.max_messages_per_connection,
            config.message_window,
            config.ip_cleanup_interval,
        ));
        let validator = MessageValidator::new(ValidationLimits {
            max_file_size_bytes: config.max_file_size_bytes,
            max_encrypted_field_len: config.max_encrypted_field_len,
        });

        Arc::new(Self {
            config,
            registry: ClientRegistry::new(),
            sessions: SessionTracker::new(),
            rate_limiter,
            validator,
            metrics: Arc::new(RelayMetrics::new()),
        })
    }

    /// Start the periodic rate-limiter sweep. Abort the handle on shutdown.
    pub fn start_maintenance(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.rate_limiter).start_cleanup_task()
    }

    /// Create the bounded outbound queue for a new connection.
    pub fn outbound_channel(
        &self,
    ) -> (mpsc::Sender<OutboundFrame>, mpsc::Receiver<OutboundFrame>) {
        mpsc::channel(self.config.outbound_queue_capacity)
    }

    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub const fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn rate_limiter(&self) -> &RelayRateLimiter {
        &self.rate_limiter
    }

    pub const fn validator(&self) -> &MessageValidator {
        &self.validator
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    pub async fn registered_count(&self) -> usize {
        self.registry.len().await
    }

    /// Current session partner of `identifier`, if any.
    pub async fn session_peer(&self, identifier: &str) -> Option<String> {
        self.sessions.peer_of(identifier).await
    }

    pub async fn health_check(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            registered_clients: self.registry.len().await,
            active_sessions: self.sessions.active_pairs().await,
            tracked_ips: self.rate_limiter.tracked_ips(),
        }
    }

    /// Best-effort delivery of a relay-generated envelope to `client`.
    pub(crate) async fn reply(&self, client: &ClientHandle, message: ServerMessage) {
        if let Err(err) = client.send(message.into()).await {
            tracing::debug!(connection_id = %client.id(), error = %err, "Dropped reply to closed connection");
        }
    }

    /// Tell `peer` that `departed` left, without blocking the caller.
    ///
    /// The send is bounded by `notify_timeout`; a full or closed queue drops
    /// the notification.
    pub(crate) fn notify_session_end(&self, peer: ClientHandle, peer_id: String, departed: String) {
        let timeout = self.config.notify_timeout;
        let metrics = Arc::clone(&self.metrics);
        let frame = OutboundFrame::from(ServerMessage::SessionEnded {
            target_id: peer_id.clone(),
            sender_id: departed.clone(),
        });

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, peer.send(frame)).await {
                Ok(Ok(())) => {
                    metrics.increment_disconnect_notifications();
                    tracing::info!(peer = %peer_id, departed = %departed, "Notified peer of disconnect");
                }
                Ok(Err(err)) => {
                    metrics.increment_disconnect_notifications_failed();
                    tracing::debug!(peer = %peer_id, departed = %departed, error = %err, "Peer already gone");
                }
                Err(_) => {
                    metrics.increment_disconnect_notifications_failed();
                    tracing::warn!(
                        peer = %peer_id,
                        departed = %departed,
                        timeout_ms = timeout.as_millis(),
                        "Timed out notifying peer of disconnect"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_from_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections_per_ip, 10);
        assert_eq!(config.connection_window, Duration::from_secs(60));
        assert_eq!(config.max_messages_per_connection, 20);
        assert_eq!(config.message_window, Duration::from_secs(5));
        assert_eq!(config.max_file_size_bytes, Some(100 * 1024 * 1024));
        assert_eq!(config.notify_timeout, Duration::from_millis(1000));
        assert!(!config.debug);
    }

    #[tokio::test]
    async fn health_check_on_empty_server() {
        let server = RelayServer::new(ServerConfig::default());
        let report = server.health_check().await;
        assert_eq!(report.status, "ok");
        assert_eq!(report.registered_clients, 0);
        assert_eq!(report.active_sessions, 0);
    }

    #[tokio::test]
    async fn client_handle_send_fails_after_receiver_drops() {
        let server = RelayServer::new(ServerConfig::default());
        let (tx, rx) = server.outbound_channel();
        let handle = ClientHandle::new("127.0.0.1".parse().unwrap(), tx);
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(
            handle.send(OutboundFrame::Text("x".into())).await,
            Err(RelayError::QueueClosed(handle.id()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn session_end_notification_times_out_on_full_queue() {
        let mut config = ServerConfig::default();
        config.outbound_queue_capacity = 1;
        let server = RelayServer::new(config);
        let (tx, mut rx) = server.outbound_channel();
        let peer = ClientHandle::new("127.0.0.1".parse().unwrap(), tx);
        peer.send(OutboundFrame::Text("filler".into())).await.unwrap();

        server.notify_session_end(peer, "bob".into(), "alice".into());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            server
                .metrics()
                .disconnect_notifications_failed
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("filler".into())));
        assert!(rx.try_recv().is_err());
    }
}
