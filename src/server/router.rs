use tracing::{debug, info};

use crate::protocol::{MessageType, RelayEnvelope, ServerMessage};

use super::{ClientHandle, OutboundFrame, RelayServer};

/// Result of routing one relayable envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    /// Target was unknown or its queue closed; the sender got a `-1`.
    Unavailable,
}

impl RelayServer {
    /// Forward `raw` unchanged to the envelope's target.
    ///
    /// Session bookkeeping only happens after the frame was queued on the
    /// target, so a failed delivery never pairs or unpairs anyone.
    pub async fn route(
        &self,
        sender: &ClientHandle,
        sender_id: &str,
        envelope: &RelayEnvelope,
        raw: &str,
    ) -> RouteOutcome {
        let target_id = envelope.target_id.as_str();

        let Some(target) = self.registry().lookup(target_id).await else {
            info!(sender = %sender_id, target = %target_id, message_type = %envelope.message_type, "Relay target not found");
            return self.report_unavailable(sender, target_id).await;
        };

        if let Err(err) = target.send(OutboundFrame::Text(raw.to_string())).await {
            info!(sender = %sender_id, target = %target_id, error = %err, "Relay target queue closed");
            return self.report_unavailable(sender, target_id).await;
        }

        self.metrics().increment_frames_relayed();
        match envelope.message_type {
            MessageType::FileChunk => debug!(
                sender = %sender_id,
                target = %target_id,
                transfer_id = envelope.transfer_id.as_deref().unwrap_or_default(),
                chunk_index = envelope.chunk_index.unwrap_or_default(),
                "Relayed file chunk"
            ),
            message_type => debug!(sender = %sender_id, target = %target_id, %message_type, "Relayed envelope"),
        }

        if self
            .sessions()
            .on_relay_succeeded(envelope.message_type, sender_id, target_id)
            .await
        {
            if envelope.message_type.opens_session() {
                self.metrics().increment_sessions_opened();
                info!(sender = %sender_id, target = %target_id, "Session established");
            } else {
                self.metrics().increment_sessions_ended();
                info!(sender = %sender_id, target = %target_id, "Session ended");
            }
        }

        RouteOutcome::Delivered
    }

    async fn report_unavailable(&self, sender: &ClientHandle, target_id: &str) -> RouteOutcome {
        self.metrics().increment_peer_unavailable();
        self.reply(
            sender,
            ServerMessage::PeerUnavailable {
                target_id: target_id.to_string(),
            },
        )
        .await;
        RouteOutcome::Unavailable
    }
}
