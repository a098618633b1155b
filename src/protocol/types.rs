use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Server-assigned handle for one live transport.
pub type ConnectionId = Uuid;

pub const IDENTIFIER_MIN_LENGTH: usize = 3;
pub const IDENTIFIER_MAX_LENGTH: usize = 30;

/// `^[A-Za-z0-9][A-Za-z0-9_-]{2,29}$`
pub fn is_valid_identifier(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }

    // ASCII-only from here on, so byte length equals char count.
    (IDENTIFIER_MIN_LENGTH..=IDENTIFIER_MAX_LENGTH).contains(&candidate.len())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Inbound envelope types understood by the relay.
///
/// Everything except [`MessageType::Register`] is addressed to another client
/// and forwarded verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Register,
    SessionRequest,
    SessionAccept,
    SessionDeny,
    PublicKeyResponse,
    KeyConfirmationChallenge,
    KeyConfirmationResponse,
    SessionEstablished,
    EncryptedMessage,
    SessionEnd,
    TypingStart,
    TypingStop,
    FileTransferRequest,
    FileTransferAccept,
    FileTransferReject,
    FileChunk,
    FileTransferComplete,
    FileTransferError,
}

impl MessageType {
    pub const ALL: [Self; 18] = [
        Self::Register,
        Self::SessionRequest,
        Self::SessionAccept,
        Self::SessionDeny,
        Self::PublicKeyResponse,
        Self::KeyConfirmationChallenge,
        Self::KeyConfirmationResponse,
        Self::SessionEstablished,
        Self::EncryptedMessage,
        Self::SessionEnd,
        Self::TypingStart,
        Self::TypingStop,
        Self::FileTransferRequest,
        Self::FileTransferAccept,
        Self::FileTransferReject,
        Self::FileChunk,
        Self::FileTransferComplete,
        Self::FileTransferError,
    ];

    pub const fn code(self) -> u8 {
        match self {
            Self::Register => 0,
            Self::SessionRequest => 1,
            Self::SessionAccept => 2,
            Self::SessionDeny => 3,
            Self::PublicKeyResponse => 4,
            Self::KeyConfirmationChallenge => 5,
            Self::KeyConfirmationResponse => 6,
            Self::SessionEstablished => 7,
            Self::EncryptedMessage => 8,
            Self::SessionEnd => 9,
            Self::TypingStart => 10,
            Self::TypingStop => 11,
            Self::FileTransferRequest => 12,
            Self::FileTransferAccept => 13,
            Self::FileTransferReject => 14,
            Self::FileChunk => 15,
            Self::FileTransferComplete => 16,
            Self::FileTransferError => 17,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| u64::from(t.code()) == code)
    }

    /// Interpret a JSON `type` value. Integral floats (`8.0`) are accepted;
    /// anything else that is not a known code yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        if let Some(code) = value.as_u64() {
            return Self::from_code(code);
        }
        let float = value.as_f64()?;
        if float.fract() != 0.0 || float < 0.0 || float > f64::from(u8::MAX) {
            return None;
        }
        // Range-checked above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self::from_code(float as u64)
    }

    /// A successful relay of this type opens an active session.
    pub const fn opens_session(self) -> bool {
        matches!(self, Self::SessionAccept)
    }

    /// A successful relay of this type closes the active session.
    pub const fn ends_session(self) -> bool {
        matches!(self, Self::SessionEnd)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::SessionRequest => "session_request",
            Self::SessionAccept => "session_accept",
            Self::SessionDeny => "session_deny",
            Self::PublicKeyResponse => "public_key_response",
            Self::KeyConfirmationChallenge => "key_confirmation_challenge",
            Self::KeyConfirmationResponse => "key_confirmation_response",
            Self::SessionEstablished => "session_established",
            Self::EncryptedMessage => "encrypted_message",
            Self::SessionEnd => "session_end",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::FileTransferRequest => "file_transfer_request",
            Self::FileTransferAccept => "file_transfer_accept",
            Self::FileTransferReject => "file_transfer_reject",
            Self::FileChunk => "file_chunk",
            Self::FileTransferComplete => "file_transfer_complete",
            Self::FileTransferError => "file_transfer_error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

/// Numeric `type` of an envelope generated by the relay itself.
///
/// Registration acks use the fractional codes 0.1 and 0.2, so the wire type is
/// not always an integer. Integral codes are written without a decimal point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireType {
    Code(i64),
    Fractional(f64),
}

impl WireType {
    pub const REGISTERED: Self = Self::Fractional(0.1);
    pub const REGISTRATION_FAILED: Self = Self::Fractional(0.2);
    pub const PEER_UNAVAILABLE: Self = Self::Code(-1);
    pub const RATE_LIMITED: Self = Self::Code(-2);
    pub const SESSION_END: Self = Self::Code(9);
    pub const FILE_TRANSFER_ERROR: Self = Self::Code(17);
}

impl Serialize for WireType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Code(code) => serializer.serialize_i64(*code),
            Self::Fractional(value) => serializer.serialize_f64(*value),
        }
    }
}
