use serde::Serialize;

use super::types::WireType;

/// Reason carried in a `0.2` registration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationFailure {
    InvalidFormat,
    Taken,
    AlreadyRegistered,
}

impl RegistrationFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::Taken => "taken",
            Self::AlreadyRegistered => "already_registered",
        }
    }
}

/// Envelopes the relay produces itself. Client traffic is never re-encoded;
/// it is forwarded as the exact text that arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `0.1`, registration acknowledged.
    Registered { identifier: String },
    /// `0.2`, registration refused.
    RegistrationFailed {
        identifier: Option<String>,
        reason: RegistrationFailure,
        error: String,
    },
    /// `-1`, relay target is not connected.
    PeerUnavailable { target_id: String },
    /// `-2`, sent right before a rate-limit close.
    RateLimited,
    /// `9` on behalf of a departed peer.
    SessionEnded { target_id: String, sender_id: String },
    /// `17`, a transfer was refused by the relay.
    FileTransferError {
        target_id: String,
        sender_id: String,
        transfer_id: Option<String>,
        error: String,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: WireType,
    payload: Payload<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Payload<'a> {
    Registered {
        identifier: &'a str,
        message: &'static str,
    },
    RegistrationFailed {
        identifier: Option<&'a str>,
        reason: RegistrationFailure,
        error: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    PeerUnavailable { target_id: &'a str, message: String },
    RateLimited { error: &'static str },
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        target_id: &'a str,
        sender_id: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    FileTransferError {
        target_id: &'a str,
        sender_id: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        transfer_id: Option<&'a str>,
        error: &'a str,
    },
}

impl ServerMessage {
    pub const fn wire_type(&self) -> WireType {
        match self {
            Self::Registered { .. } => WireType::REGISTERED,
            Self::RegistrationFailed { .. } => WireType::REGISTRATION_FAILED,
            Self::PeerUnavailable { .. } => WireType::PEER_UNAVAILABLE,
            Self::RateLimited => WireType::RATE_LIMITED,
            Self::SessionEnded { .. } => WireType::SESSION_END,
            Self::FileTransferError { .. } => WireType::FILE_TRANSFER_ERROR,
        }
    }

    fn payload(&self) -> Payload<'_> {
        match self {
            Self::Registered { identifier } => Payload::Registered {
                identifier,
                message: "Registration successful.",
            },
            Self::RegistrationFailed {
                identifier,
                reason,
                error,
            } => Payload::RegistrationFailed {
                identifier: identifier.as_deref(),
                reason: *reason,
                error,
            },
            Self::PeerUnavailable { target_id } => Payload::PeerUnavailable {
                target_id,
                message: format!("User '{target_id}' is unavailable."),
            },
            Self::RateLimited => Payload::RateLimited {
                error: "Message rate limit exceeded. Disconnecting.",
            },
            Self::SessionEnded {
                target_id,
                sender_id,
            } => Payload::SessionEnded {
                target_id,
                sender_id,
            },
            Self::FileTransferError {
                target_id,
                sender_id,
                transfer_id,
                error,
            } => Payload::FileTransferError {
                target_id,
                sender_id,
                transfer_id: transfer_id.as_deref(),
                error,
            },
        }
    }

    /// Render the `{"type": .., "payload": {..}}` text frame.
    pub fn to_json(&self) -> String {
        let envelope = Envelope {
            kind: self.wire_type(),
            payload: self.payload(),
        };
        // Only strings and finite numbers are involved, which cannot fail to serialize.
        serde_json::to_string(&envelope).unwrap_or_default()
    }
}
