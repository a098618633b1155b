use criterion::{criterion_group, criterion_main, Criterion};
use helix_relay::protocol::{is_valid_identifier, MessageValidator, ValidationLimits};
use serde_json::json;
use std::hint::black_box;

fn bench_message_validation(c: &mut Criterion) {
    let validator = MessageValidator::new(ValidationLimits::default());

    let encrypted = json!({
        "type": 8,
        "payload": {
            "targetId": "bob",
            "senderId": "alice",
            "iv": "AAECAwQFBgcICQoL",
            "data": "QUJD".repeat(256)
        }
    })
    .to_string();

    c.bench_function("validate_encrypted_message", |b| {
        b.iter(|| black_box(validator.validate(black_box(&encrypted), Some("alice"))));
    });

    let chunk = json!({
        "type": 15,
        "payload": {
            "targetId": "bob",
            "senderId": "alice",
            "transferId": "transfer-0001",
            "chunkIndex": 42,
            "iv": "AAECAwQFBgcICQoL",
            "data": "ZmlsZQ==".repeat(8 * 1024)
        }
    })
    .to_string();

    c.bench_function("validate_file_chunk_64k", |b| {
        b.iter(|| black_box(validator.validate(black_box(&chunk), Some("alice"))));
    });

    c.bench_function("validate_malformed_frame", |b| {
        b.iter(|| black_box(validator.validate(black_box("{\"type\": 8, \"payload\": "), None)));
    });

    c.bench_function("identifier_grammar", |b| {
        b.iter(|| {
            for candidate in ["alice", "bob_the-builder99", "-nope", "x", "émile"] {
                black_box(is_valid_identifier(black_box(candidate)));
            }
        });
    });
}

criterion_group!(message_validation, bench_message_validation);
criterion_main!(message_validation);
