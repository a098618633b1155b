//! Sliding-window throttling for connection attempts and inbound frames.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

use crate::protocol::ConnectionId;

/// Sliding-window limiter backed by `DashMap`.
///
/// Each key maps to a `VecDeque<Instant>` with the timestamps of recent
/// accepted events. A check trims entries at least `window` old from the front,
/// refuses when `max_events` remain, and records `now` otherwise. The trim,
/// compare and push happen under the key's shard lock, so concurrent checks on
/// one key never over-admit.
#[derive(Debug)]
pub struct SlidingWindowLimiter<K>
where
    K: Eq + Hash,
{
    windows: DashMap<K, VecDeque<Instant>>,
    max_events: usize,
    window: Duration,
}

impl<K> SlidingWindowLimiter<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_events,
            window,
        }
    }

    /// Record an event for `key` if it is under the limit.
    pub fn check(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.clone()).or_default();
        let timestamps = entry.value_mut();

        trim_expired(timestamps, now, self.window);

        if timestamps.len() >= self.max_events {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Events for `key` still inside the window.
    pub fn recent(&self, key: &K) -> usize {
        let now = Instant::now();
        self.windows.get(key).map_or(0, |timestamps| {
            timestamps
                .iter()
                .filter(|&&at| now.duration_since(at) < self.window)
                .count()
        })
    }

    pub fn forget(&self, key: &K) {
        self.windows.remove(key);
    }

    /// Drop keys whose windows have fully expired. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_key, timestamps| {
            trim_expired(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub const fn max_events(&self) -> usize {
        self.max_events
    }

    pub const fn window(&self) -> Duration {
        self.window
    }
}

fn trim_expired(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// The two throttles the relay applies: connection attempts per source IP and
/// inbound frames per connection.
#[derive(Debug)]
pub struct RelayRateLimiter {
    connections: SlidingWindowLimiter<IpAddr>,
    messages: SlidingWindowLimiter<ConnectionId>,
    cleanup_interval: Duration,
}

impl RelayRateLimiter {
    pub fn new(
        max_connections_per_ip: usize,
        connection_window: Duration,
        max_messages_per_connection: usize,
        message_window: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            connections: SlidingWindowLimiter::new(max_connections_per_ip, connection_window),
            messages: SlidingWindowLimiter::new(max_messages_per_connection, message_window),
            cleanup_interval,
        }
    }

    /// Called once per connection attempt before any frame is processed.
    pub fn allow_connection(&self, ip: IpAddr) -> bool {
        let allowed = self.connections.check(&ip);
        if !allowed {
            tracing::warn!(
                client_ip = %ip,
                limit = self.connections.max_events(),
                window_secs = self.connections.window().as_secs(),
                "Connection rate limit exceeded"
            );
        }
        allowed
    }

    /// Called once per inbound frame.
    pub fn allow_message(&self, connection_id: ConnectionId) -> bool {
        let allowed = self.messages.check(&connection_id);
        if !allowed {
            tracing::warn!(
                %connection_id,
                limit = self.messages.max_events(),
                window_secs = self.messages.window().as_secs(),
                "Message rate limit exceeded"
            );
        }
        allowed
    }

    /// Discard a closed connection's message window.
    pub fn forget_connection(&self, connection_id: ConnectionId) {
        self.messages.forget(&connection_id);
    }

    /// Sweep aged-out per-IP windows. Message windows are removed on disconnect,
    /// so only stragglers are collected there.
    pub fn cleanup(&self) -> usize {
        let ips = self.connections.cleanup();
        let connections = self.messages.cleanup();
        if ips + connections > 0 {
            tracing::debug!(
                expired_ip_windows = ips,
                expired_connection_windows = connections,
                "Rate limiter cleanup"
            );
        }
        ips + connections
    }

    pub fn tracked_ips(&self) -> usize {
        self.connections.tracked_keys()
    }

    pub fn tracked_connections(&self) -> usize {
        self.messages.tracked_keys()
    }

    pub fn recent_connections(&self, ip: IpAddr) -> usize {
        self.connections.recent(&ip)
    }

    /// Spawn a background task that periodically sweeps expired windows.
    ///
    /// Returns the `JoinHandle` so callers can abort the task during shutdown.
    pub fn start_cleanup_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.cleanup_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                self.cleanup();
            }
        })
    }
}
