// Protocol module: envelope types, identifier grammar and validation

pub mod messages;
pub mod types;
pub mod validation;

pub use messages::{RegistrationFailure, ServerMessage};

pub use types::{
    is_valid_identifier, ConnectionId, MessageType, WireType, IDENTIFIER_MAX_LENGTH,
    IDENTIFIER_MIN_LENGTH,
};

pub use validation::{
    InboundMessage, MessageValidator, RelayEnvelope, ValidationError, ValidationLimits,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use regex::Regex;
    use serde_json::json;

    proptest! {
        #[test]
        fn identifier_check_matches_reference_pattern(candidate in "[ -~]{0,40}") {
            let pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{2,29}$").unwrap();
            prop_assert_eq!(is_valid_identifier(&candidate), pattern.is_match(&candidate));
        }

        #[test]
        fn generated_identifiers_register(candidate in "[A-Za-z0-9][A-Za-z0-9_-]{2,29}") {
            let validator = MessageValidator::default();
            let raw = json!({"type": 0, "payload": {"identifier": candidate.clone()}}).to_string();
            prop_assert_eq!(
                validator.validate(&raw, None),
                Ok(InboundMessage::Register { identifier: candidate })
            );
        }

        #[test]
        fn validator_never_panics_on_arbitrary_text(raw in any::<String>()) {
            let _ = MessageValidator::default().validate(&raw, Some("alice"));
        }
    }
}
