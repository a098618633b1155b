use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::protocol::MessageType;

/// Symmetric pairing of identifiers that completed a session handshake.
///
/// `A -> B` is present exactly when `B -> A` is. The relay only uses this to
/// tell a peer that its partner disconnected.
#[derive(Default)]
pub struct SessionTracker {
    pairs: RwLock<HashMap<String, String>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the effect of a successfully delivered envelope.
    ///
    /// Returns `true` when the pairing changed.
    pub async fn on_relay_succeeded(
        &self,
        message_type: MessageType,
        sender_id: &str,
        target_id: &str,
    ) -> bool {
        if message_type.opens_session() {
            self.pair(sender_id, target_id).await
        } else if message_type.ends_session() {
            self.unpair(sender_id, target_id).await
        } else {
            false
        }
    }

    /// Drop `identifier`'s pairing and return the partner it had.
    pub async fn on_disconnect(&self, identifier: &str) -> Option<String> {
        let mut pairs = self.pairs.write().await;
        let peer = pairs.remove(identifier)?;
        if pairs.get(&peer).is_some_and(|back| back == identifier) {
            pairs.remove(&peer);
        }
        debug!(%identifier, %peer, "Session dropped on disconnect");
        Some(peer)
    }

    pub async fn peer_of(&self, identifier: &str) -> Option<String> {
        self.pairs.read().await.get(identifier).cloned()
    }

    pub async fn active_pairs(&self) -> usize {
        self.pairs.read().await.len() / 2
    }

    async fn pair(&self, a: &str, b: &str) -> bool {
        let mut pairs = self.pairs.write().await;
        if pairs.get(a).is_some_and(|peer| peer == b) {
            return false;
        }

        // Re-pairing breaks any previous sessions either side had.
        for side in [a, b] {
            if let Some(previous) = pairs.remove(side) {
                if pairs.get(&previous).is_some_and(|back| back == side) {
                    pairs.remove(&previous);
                }
            }
        }

        pairs.insert(a.to_string(), b.to_string());
        pairs.insert(b.to_string(), a.to_string());
        debug!(sender = %a, target = %b, "Session opened");
        true
    }

    async fn unpair(&self, a: &str, b: &str) -> bool {
        let mut pairs = self.pairs.write().await;
        if !pairs.get(a).is_some_and(|peer| peer == b) {
            return false;
        }
        pairs.remove(a);
        pairs.remove(b);
        debug!(sender = %a, target = %b, "Session ended");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_pairs_both_directions() {
        let sessions = SessionTracker::new();
        assert!(
            sessions
                .on_relay_succeeded(MessageType::SessionAccept, "bob", "alice")
                .await
        );
        assert_eq!(sessions.peer_of("alice").await.as_deref(), Some("bob"));
        assert_eq!(sessions.peer_of("bob").await.as_deref(), Some("alice"));
        assert_eq!(sessions.active_pairs().await, 1);
    }

    #[tokio::test]
    async fn other_types_do_not_pair() {
        let sessions = SessionTracker::new();
        for message_type in [
            MessageType::SessionRequest,
            MessageType::EncryptedMessage,
            MessageType::FileChunk,
        ] {
            assert!(!sessions.on_relay_succeeded(message_type, "a", "b").await);
        }
        assert_eq!(sessions.peer_of("a").await, None);
    }

    #[tokio::test]
    async fn end_only_clears_matching_pair() {
        let sessions = SessionTracker::new();
        sessions
            .on_relay_succeeded(MessageType::SessionAccept, "alice", "bob")
            .await;

        assert!(
            !sessions
                .on_relay_succeeded(MessageType::SessionEnd, "alice", "carol")
                .await
        );
        assert_eq!(sessions.peer_of("alice").await.as_deref(), Some("bob"));

        assert!(
            sessions
                .on_relay_succeeded(MessageType::SessionEnd, "bob", "alice")
                .await
        );
        assert_eq!(sessions.peer_of("alice").await, None);
        assert_eq!(sessions.peer_of("bob").await, None);
    }

    #[tokio::test]
    async fn repairing_keeps_map_symmetric() {
        let sessions = SessionTracker::new();
        sessions
            .on_relay_succeeded(MessageType::SessionAccept, "alice", "bob")
            .await;
        sessions
            .on_relay_succeeded(MessageType::SessionAccept, "alice", "carol")
            .await;

        assert_eq!(sessions.peer_of("alice").await.as_deref(), Some("carol"));
        assert_eq!(sessions.peer_of("carol").await.as_deref(), Some("alice"));
        assert_eq!(sessions.peer_of("bob").await, None);
        assert_eq!(sessions.active_pairs().await, 1);
    }

    #[tokio::test]
    async fn disconnect_returns_peer_once() {
        let sessions = SessionTracker::new();
        sessions
            .on_relay_succeeded(MessageType::SessionAccept, "alice", "bob")
            .await;

        assert_eq!(sessions.on_disconnect("alice").await.as_deref(), Some("bob"));
        assert_eq!(sessions.peer_of("bob").await, None);
        assert_eq!(sessions.on_disconnect("alice").await, None);
        assert_eq!(sessions.on_disconnect("bob").await, None);
    }
}
