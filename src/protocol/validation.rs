//! Structural validation of inbound envelopes.
//!
//! Every inbound text frame must be a JSON object `{"type": <int>, "payload": {..}}`.
//! Each [`MessageType`] owns a field schema; validation walks that schema and
//! then applies the checks that span fields (sender binding, file size cap).
//! Adding a type means adding a variant and its schema, nothing else.

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{is_valid_identifier, MessageType, IDENTIFIER_MAX_LENGTH};

pub const MAX_PUBLIC_KEY_LENGTH: usize = 512;
pub const MAX_IV_LENGTH: usize = 32;
pub const MAX_TRANSFER_ID_LENGTH: usize = 64;
pub const MAX_FILE_NAME_LENGTH: usize = 255;
pub const MAX_FILE_TYPE_LENGTH: usize = 100;

/// Limits that come from configuration rather than the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_file_size_bytes: Option<u64>,
    pub max_encrypted_field_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: Some(100 * 1024 * 1024),
            max_encrypted_field_len: 128 * 1024,
        }
    }
}

/// A frame that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Register { identifier: String },
    Relay(RelayEnvelope),
}

/// The parts of a relayable envelope the router needs. The frame itself is
/// forwarded untouched, so nothing else is extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEnvelope {
    pub message_type: MessageType,
    pub target_id: String,
    pub transfer_id: Option<String>,
    pub chunk_index: Option<u64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("envelope must be a JSON object")]
    NotAnObject,
    #[error("unknown or missing message type: {0}")]
    UnknownType(String),
    #[error("payload must be a JSON object")]
    InvalidPayload { message_type: MessageType },
    #[error("identifier must match [A-Za-z0-9][A-Za-z0-9_-]{{2,29}}")]
    InvalidIdentifier { identifier: Option<String> },
    #[error("missing or invalid `{field}` for message type {message_type}")]
    InvalidField {
        message_type: MessageType,
        field: &'static str,
    },
    #[error("senderId does not match the registered identifier")]
    SenderMismatch { message_type: MessageType },
    #[error("announced file size {size} exceeds the {max} byte limit")]
    FileTooLarge {
        target_id: String,
        transfer_id: Option<String>,
        size: u64,
        max: u64,
    },
}

impl ValidationError {
    /// Short machine-readable label for logs and metrics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::UnknownType(_) => "unknown_type",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::InvalidIdentifier { .. } => "invalid_identifier",
            Self::InvalidField { .. } => "invalid_field",
            Self::SenderMismatch { .. } => "sender_mismatch",
            Self::FileTooLarge { .. } => "file_too_large",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Fixed(usize),
    EncryptedField,
}

#[derive(Debug, Clone, Copy)]
enum FieldRule {
    /// Non-blank string, trimmed length within the bound.
    Text(&'static str, usize),
    /// Non-empty string of `[A-Za-z0-9+/=]`.
    Base64(&'static str, Bound),
    /// Non-negative integer.
    Count(&'static str),
    /// String when present.
    OptionalText(&'static str),
}

const fn schema(message_type: MessageType) -> &'static [FieldRule] {
    use FieldRule::{Base64, Count, OptionalText, Text};

    match message_type {
        MessageType::Register
        | MessageType::SessionRequest
        | MessageType::SessionDeny
        | MessageType::SessionEstablished
        | MessageType::SessionEnd
        | MessageType::TypingStart
        | MessageType::TypingStop => &[],
        MessageType::SessionAccept | MessageType::PublicKeyResponse => {
            &[Base64("publicKey", Bound::Fixed(MAX_PUBLIC_KEY_LENGTH))]
        }
        MessageType::KeyConfirmationChallenge => &[
            Base64("iv", Bound::Fixed(MAX_IV_LENGTH)),
            Base64("encryptedChallenge", Bound::EncryptedField),
        ],
        MessageType::KeyConfirmationResponse => &[
            Base64("iv", Bound::Fixed(MAX_IV_LENGTH)),
            Base64("encryptedResponse", Bound::EncryptedField),
        ],
        MessageType::EncryptedMessage => &[
            Base64("iv", Bound::Fixed(MAX_IV_LENGTH)),
            Base64("data", Bound::EncryptedField),
        ],
        MessageType::FileTransferRequest => &[
            Text("transferId", MAX_TRANSFER_ID_LENGTH),
            Text("fileName", MAX_FILE_NAME_LENGTH),
            Count("fileSize"),
            Text("fileType", MAX_FILE_TYPE_LENGTH),
        ],
        MessageType::FileTransferAccept
        | MessageType::FileTransferReject
        | MessageType::FileTransferComplete => &[Text("transferId", MAX_TRANSFER_ID_LENGTH)],
        MessageType::FileChunk => &[
            Text("transferId", MAX_TRANSFER_ID_LENGTH),
            Count("chunkIndex"),
            Base64("iv", Bound::Fixed(MAX_IV_LENGTH)),
            Base64("data", Bound::EncryptedField),
        ],
        MessageType::FileTransferError => &[
            Text("transferId", MAX_TRANSFER_ID_LENGTH),
            OptionalText("error"),
        ],
    }
}

/// Validates raw text frames against the per-type schemas.
#[derive(Debug, Clone, Default)]
pub struct MessageValidator {
    limits: ValidationLimits,
}

impl MessageValidator {
    pub const fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub const fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validate one frame.
    ///
    /// `caller` is the identifier the connection is registered under, if any.
    /// When present, a relayable envelope must carry a matching `senderId`.
    pub fn validate(
        &self,
        raw: &str,
        caller: Option<&str>,
    ) -> Result<InboundMessage, ValidationError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| ValidationError::InvalidJson(err.to_string()))?;
        let Value::Object(envelope) = value else {
            return Err(ValidationError::NotAnObject);
        };

        let message_type = envelope
            .get("type")
            .ok_or_else(|| ValidationError::UnknownType("missing".to_string()))
            .and_then(|raw_type| {
                MessageType::from_json(raw_type)
                    .ok_or_else(|| ValidationError::UnknownType(raw_type.to_string()))
            })?;

        let Some(Value::Object(payload)) = envelope.get("payload") else {
            return Err(ValidationError::InvalidPayload { message_type });
        };

        if message_type == MessageType::Register {
            return Self::validate_registration(payload);
        }

        let target_id = text_field(payload, "targetId", IDENTIFIER_MAX_LENGTH).ok_or(
            ValidationError::InvalidField {
                message_type,
                field: "targetId",
            },
        )?;

        for rule in schema(message_type) {
            self.check_rule(payload, *rule)
                .map_err(|field| ValidationError::InvalidField {
                    message_type,
                    field,
                })?;
        }

        if let Some(caller) = caller {
            let sender_matches = payload
                .get("senderId")
                .and_then(Value::as_str)
                .is_some_and(|sender| sender == caller);
            if !sender_matches {
                return Err(ValidationError::SenderMismatch { message_type });
            }
        }

        let transfer_id = payload
            .get("transferId")
            .and_then(Value::as_str)
            .map(str::to_string);

        if message_type == MessageType::FileTransferRequest {
            if let (Some(max), Some(size)) = (
                self.limits.max_file_size_bytes,
                payload.get("fileSize").and_then(Value::as_u64),
            ) {
                if size > max {
                    return Err(ValidationError::FileTooLarge {
                        target_id: target_id.to_string(),
                        transfer_id,
                        size,
                        max,
                    });
                }
            }
        }

        Ok(InboundMessage::Relay(RelayEnvelope {
            message_type,
            target_id: target_id.to_string(),
            transfer_id,
            chunk_index: payload.get("chunkIndex").and_then(Value::as_u64),
        }))
    }

    fn validate_registration(payload: &Map<String, Value>) -> Result<InboundMessage, ValidationError> {
        match payload.get("identifier") {
            Some(Value::String(identifier)) if is_valid_identifier(identifier) => {
                Ok(InboundMessage::Register {
                    identifier: identifier.clone(),
                })
            }
            Some(Value::String(identifier)) => Err(ValidationError::InvalidIdentifier {
                identifier: Some(identifier.clone()),
            }),
            _ => Err(ValidationError::InvalidIdentifier { identifier: None }),
        }
    }

    fn check_rule(&self, payload: &Map<String, Value>, rule: FieldRule) -> Result<(), &'static str> {
        let (name, ok) = match rule {
            FieldRule::Text(name, max) => (name, text_field(payload, name, max).is_some()),
            FieldRule::Base64(name, bound) => {
                let max = match bound {
                    Bound::Fixed(max) => max,
                    Bound::EncryptedField => self.limits.max_encrypted_field_len,
                };
                (name, base64_field(payload, name, max))
            }
            FieldRule::Count(name) => (name, payload.get(name).is_some_and(Value::is_u64)),
            FieldRule::OptionalText(name) => (
                name,
                payload.get(name).map_or(true, Value::is_string),
            ),
        };
        if ok {
            Ok(())
        } else {
            Err(name)
        }
    }
}

fn text_field<'a>(payload: &'a Map<String, Value>, name: &str, max: usize) -> Option<&'a str> {
    let value = payload.get(name)?.as_str()?;
    let trimmed_len = value.trim().chars().count();
    (trimmed_len > 0 && trimmed_len <= max).then_some(value)
}

fn base64_field(payload: &Map<String, Value>, name: &str, max: usize) -> bool {
    payload
        .get(name)
        .and_then(Value::as_str)
        .is_some_and(|value| {
            !value.is_empty()
                && value.len() <= max
                && value
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> MessageValidator {
        MessageValidator::new(ValidationLimits {
            max_file_size_bytes: Some(1000),
            max_encrypted_field_len: 64,
        })
    }

    fn frame(message_type: u8, payload: Value) -> String {
        json!({"type": message_type, "payload": payload}).to_string()
    }

    #[test]
    fn registration_requires_grammar() {
        let v = validator();
        assert_eq!(
            v.validate(&frame(0, json!({"identifier": "alice"})), None),
            Ok(InboundMessage::Register {
                identifier: "alice".into()
            })
        );
        assert_eq!(
            v.validate(&frame(0, json!({"identifier": "a!"})), None),
            Err(ValidationError::InvalidIdentifier {
                identifier: Some("a!".into())
            })
        );
        assert_eq!(
            v.validate(&frame(0, json!({"identifier": 42})), None),
            Err(ValidationError::InvalidIdentifier { identifier: None })
        );
    }

    #[test]
    fn rejects_malformed_envelopes() {
        let v = validator();
        assert!(matches!(
            v.validate("not json", None),
            Err(ValidationError::InvalidJson(_))
        ));
        assert_eq!(v.validate("[1,2]", None), Err(ValidationError::NotAnObject));
        assert!(matches!(
            v.validate(r#"{"payload": {}}"#, None),
            Err(ValidationError::UnknownType(_))
        ));
        assert!(matches!(
            v.validate(&frame(42, json!({})), None),
            Err(ValidationError::UnknownType(_))
        ));
        assert_eq!(
            v.validate(r#"{"type": 1, "payload": "x"}"#, None),
            Err(ValidationError::InvalidPayload {
                message_type: MessageType::SessionRequest
            })
        );
    }

    #[test]
    fn target_id_is_required_and_bounded() {
        let v = validator();
        assert!(v
            .validate(&frame(1, json!({"targetId": "bob"})), None)
            .is_ok());
        assert_eq!(
            v.validate(&frame(1, json!({"targetId": "   "})), None),
            Err(ValidationError::InvalidField {
                message_type: MessageType::SessionRequest,
                field: "targetId"
            })
        );
        assert!(v
            .validate(&frame(1, json!({"targetId": "b".repeat(31)})), None)
            .is_err());
    }

    #[test]
    fn encrypted_message_schema() {
        let v = validator();
        let ok = frame(
            8,
            json!({"targetId": "bob", "senderId": "alice", "iv": "AAAA", "data": "QUJD+/=="}),
        );
        assert!(v.validate(&ok, Some("alice")).is_ok());

        let bad_charset = frame(
            8,
            json!({"targetId": "bob", "senderId": "alice", "iv": "AAAA", "data": "not base64!"}),
        );
        assert_eq!(
            v.validate(&bad_charset, Some("alice")),
            Err(ValidationError::InvalidField {
                message_type: MessageType::EncryptedMessage,
                field: "data"
            })
        );

        let too_long = frame(
            8,
            json!({"targetId": "bob", "senderId": "alice", "iv": "AAAA", "data": "A".repeat(65)}),
        );
        assert!(v.validate(&too_long, Some("alice")).is_err());

        let long_iv = frame(
            8,
            json!({"targetId": "bob", "senderId": "alice", "iv": "A".repeat(33), "data": "AA"}),
        );
        assert!(v.validate(&long_iv, Some("alice")).is_err());
    }

    #[test]
    fn sender_binding_only_applies_to_registered_callers() {
        let v = validator();
        let spoofed = frame(1, json!({"targetId": "bob", "senderId": "mallory"}));
        assert_eq!(
            v.validate(&spoofed, Some("alice")),
            Err(ValidationError::SenderMismatch {
                message_type: MessageType::SessionRequest
            })
        );
        assert!(v.validate(&spoofed, None).is_ok());

        let missing = frame(1, json!({"targetId": "bob"}));
        assert!(v.validate(&missing, Some("alice")).is_err());
    }

    #[test]
    fn file_request_checks_counts_and_cap() {
        let v = validator();
        let base = json!({
            "targetId": "bob",
            "senderId": "alice",
            "transferId": "t-1",
            "fileName": "notes.txt",
            "fileType": "text/plain",
            "fileSize": 999,
        });
        assert!(v.validate(&frame(12, base.clone()), Some("alice")).is_ok());

        let mut negative = base.clone();
        negative["fileSize"] = json!(-1);
        assert_eq!(
            v.validate(&frame(12, negative), Some("alice")),
            Err(ValidationError::InvalidField {
                message_type: MessageType::FileTransferRequest,
                field: "fileSize"
            })
        );

        let mut oversized = base;
        oversized["fileSize"] = json!(1001);
        assert_eq!(
            v.validate(&frame(12, oversized), Some("alice")),
            Err(ValidationError::FileTooLarge {
                target_id: "bob".into(),
                transfer_id: Some("t-1".into()),
                size: 1001,
                max: 1000,
            })
        );
    }

    #[test]
    fn file_size_cap_can_be_disabled() {
        let v = MessageValidator::new(ValidationLimits {
            max_file_size_bytes: None,
            max_encrypted_field_len: 64,
        });
        let request = frame(
            12,
            json!({
                "targetId": "bob",
                "transferId": "t-1",
                "fileName": "big.iso",
                "fileType": "application/octet-stream",
                "fileSize": u64::MAX,
            }),
        );
        assert!(v.validate(&request, None).is_ok());
    }

    #[test]
    fn file_chunk_extracts_routing_fields() {
        let v = validator();
        let chunk = frame(
            15,
            json!({
                "targetId": "bob",
                "senderId": "alice",
                "transferId": "t-1",
                "chunkIndex": 3,
                "iv": "AAAA",
                "data": "QUJD",
            }),
        );
        assert_eq!(
            v.validate(&chunk, Some("alice")),
            Ok(InboundMessage::Relay(RelayEnvelope {
                message_type: MessageType::FileChunk,
                target_id: "bob".into(),
                transfer_id: Some("t-1".into()),
                chunk_index: Some(3),
            }))
        );
    }

    #[test]
    fn file_error_message_must_be_text_when_present() {
        let v = validator();
        assert!(v
            .validate(
                &frame(17, json!({"targetId": "bob", "transferId": "t"})),
                None
            )
            .is_ok());
        assert!(v
            .validate(
                &frame(17, json!({"targetId": "bob", "transferId": "t", "error": 5})),
                None
            )
            .is_err());
    }

    #[test]
    fn public_key_bound() {
        let v = validator();
        let key = "A".repeat(MAX_PUBLIC_KEY_LENGTH);
        assert!(v
            .validate(&frame(2, json!({"targetId": "bob", "publicKey": key})), None)
            .is_ok());
        let key = "A".repeat(MAX_PUBLIC_KEY_LENGTH + 1);
        assert!(v
            .validate(&frame(4, json!({"targetId": "bob", "publicKey": key})), None)
            .is_err());
    }

    #[test]
    fn every_type_has_a_schema_and_bare_types_pass() {
        let v = validator();
        for message_type in [
            MessageType::SessionRequest,
            MessageType::SessionDeny,
            MessageType::SessionEstablished,
            MessageType::SessionEnd,
            MessageType::TypingStart,
            MessageType::TypingStop,
        ] {
            assert!(schema(message_type).is_empty());
            assert!(v
                .validate(&frame(message_type.code(), json!({"targetId": "bob"})), None)
                .is_ok());
        }
    }
}
