use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Relay counters. All updates are relaxed atomics; a snapshot is a
/// best-effort view, not a consistent cut.
#[derive(Debug)]
pub struct RelayMetrics {
    started_at: chrono::DateTime<chrono::Utc>,

    // Connection metrics
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub disconnections: AtomicU64,
    pub connections_rejected: AtomicU64,

    // Registration metrics
    pub registrations: AtomicU64,
    pub registration_failures: AtomicU64,

    // Relay metrics
    pub frames_received: AtomicU64,
    pub frames_relayed: AtomicU64,
    pub peer_unavailable: AtomicU64,
    pub unregistered_frames_dropped: AtomicU64,
    pub file_transfers_refused: AtomicU64,

    // Session metrics
    pub sessions_opened: AtomicU64,
    pub sessions_ended: AtomicU64,
    pub disconnect_notifications: AtomicU64,
    pub disconnect_notifications_failed: AtomicU64,

    // Error tracking
    pub validation_errors: AtomicU64,
    pub message_rate_limited: AtomicU64,
    pub binary_frames_ignored: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_secs: i64,
    pub connections: ConnectionMetrics,
    pub relay: RelayTrafficMetrics,
    pub sessions: SessionMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionMetrics {
    pub total_connections: u64,
    pub active_connections: u64,
    pub disconnections: u64,
    pub connections_rejected: u64,
    pub registrations: u64,
    pub registration_failures: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayTrafficMetrics {
    pub frames_received: u64,
    pub frames_relayed: u64,
    pub peer_unavailable: u64,
    pub unregistered_frames_dropped: u64,
    pub file_transfers_refused: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionMetrics {
    pub sessions_opened: u64,
    pub sessions_ended: u64,
    pub disconnect_notifications: u64,
    pub disconnect_notifications_failed: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorMetrics {
    pub validation_errors: u64,
    pub message_rate_limited: u64,
    pub binary_frames_ignored: u64,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            disconnections: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            registration_failures: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_relayed: AtomicU64::new(0),
            peer_unavailable: AtomicU64::new(0),
            unregistered_frames_dropped: AtomicU64::new(0),
            file_transfers_refused: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_ended: AtomicU64::new(0),
            disconnect_notifications: AtomicU64::new(0),
            disconnect_notifications_failed: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            message_rate_limited: AtomicU64::new(0),
            binary_frames_ignored: AtomicU64::new(0),
        }
    }

    // Connection metrics
    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        // Use fetch_update for atomic check-then-decrement to prevent underflow
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connections_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_registrations(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_registration_failures(&self) {
        self.registration_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Relay metrics
    pub fn increment_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_frames_relayed(&self) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_peer_unavailable(&self) {
        self.peer_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unregistered_frames_dropped(&self) {
        self.unregistered_frames_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_file_transfers_refused(&self) {
        self.file_transfers_refused.fetch_add(1, Ordering::Relaxed);
    }

    // Session metrics
    pub fn increment_sessions_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_disconnect_notifications(&self) {
        self.disconnect_notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_disconnect_notifications_failed(&self) {
        self.disconnect_notifications_failed
            .fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking
    pub fn increment_validation_errors(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_message_rate_limited(&self) {
        self.message_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_binary_frames_ignored(&self) {
        self.binary_frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = chrono::Utc::now();
        MetricsSnapshot {
            timestamp: now,
            uptime_secs: (now - self.started_at).num_seconds(),
            connections: ConnectionMetrics {
                total_connections: self.total_connections.load(Ordering::Relaxed),
                active_connections: self.active_connections.load(Ordering::Relaxed),
                disconnections: self.disconnections.load(Ordering::Relaxed),
                connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
                registrations: self.registrations.load(Ordering::Relaxed),
                registration_failures: self.registration_failures.load(Ordering::Relaxed),
            },
            relay: RelayTrafficMetrics {
                frames_received: self.frames_received.load(Ordering::Relaxed),
                frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
                peer_unavailable: self.peer_unavailable.load(Ordering::Relaxed),
                unregistered_frames_dropped: self
                    .unregistered_frames_dropped
                    .load(Ordering::Relaxed),
                file_transfers_refused: self.file_transfers_refused.load(Ordering::Relaxed),
            },
            sessions: SessionMetrics {
                sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
                sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
                disconnect_notifications: self.disconnect_notifications.load(Ordering::Relaxed),
                disconnect_notifications_failed: self
                    .disconnect_notifications_failed
                    .load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                validation_errors: self.validation_errors.load(Ordering::Relaxed),
                message_rate_limited: self.message_rate_limited.load(Ordering::Relaxed),
                binary_frames_ignored: self.binary_frames_ignored.load(Ordering::Relaxed),
            },
        }
    }
}
