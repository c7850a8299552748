//! Property-based tests (fuzzing) for broker input handling.
//!
//! Uses proptest to throw random payloads, reply bodies and keys at the
//! pure parts of the broker and verify they never panic and keep their
//! documented guarantees.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{json, Value};

use response_broker::broker::PayloadFields;
use response_broker::matcher::numeric_token;
use response_broker::tier::normalize_key;
use response_broker::{CacheTier, ClassifiedOutcome, Classifier, TrackingHandle, WorkRequest};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate arbitrary JSON values (including odd structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// Payload shaped like a real submission, with fields randomly missing or mistyped
fn submission_strategy() -> impl Strategy<Value = Value> {
    (
        prop::option::of(arbitrary_json_strategy()),
        prop::option::of(arbitrary_json_strategy()),
        prop::option::of(arbitrary_json_strategy()),
    )
        .prop_map(|(lessee, timestamp, description)| {
            let mut map = serde_json::Map::new();
            if let Some(v) = lessee {
                map.insert("lesseeName".into(), v);
            }
            if let Some(v) = timestamp {
                map.insert("timestamp".into(), v);
            }
            if let Some(v) = description {
                map.insert("itemDescription".into(), v);
            }
            Value::Object(map)
        })
}

fn handle() -> TrackingHandle {
    TrackingHandle::from("acme_1700000000000")
}

// =============================================================================
// Key normalization
// =============================================================================

proptest! {
    #[test]
    fn prop_normalize_is_idempotent(key in "[ \\tA-Za-z0-9_.-]{0,40}") {
        let once = normalize_key(&key);
        prop_assert_eq!(normalize_key(&once), once.clone());
        prop_assert_eq!(once.trim(), once.as_str());
        prop_assert!(!once.chars().any(|c| c.is_ascii_uppercase()));
    }

    /// Cosmetic variants of a key hit the same cache entry
    #[test]
    fn prop_cache_ignores_case_and_padding(
        key in "[A-Za-z0-9][A-Za-z0-9 ]{0,20}[A-Za-z0-9]",
        pad in "[ \\t]{0,3}",
        value in arbitrary_json_strategy(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let tier = CacheTier::local_only(None);

        let found = rt.block_on(async {
            tier.set(&key, &value).await;
            tier.get(&format!("{}{}{}", pad, key.to_uppercase(), pad)).await
        });
        prop_assert_eq!(found, Some(value));
    }
}

// =============================================================================
// Reply classification
// =============================================================================

proptest! {
    /// Any status and body classify without panicking
    #[test]
    fn fuzz_classifier_never_panics(status in any::<u16>(), body in ".*") {
        let _ = Classifier::default().classify(status, &body, &handle());
    }

    #[test]
    fn prop_404_is_always_not_active(body in ".*") {
        prop_assert_eq!(Classifier::default().classify(404, &body, &handle()), ClassifiedOutcome::NotActive);
    }

    #[test]
    fn prop_blank_success_is_async_started(status in 200u16..300, body in "[ \\t\\r\\n]{0,10}") {
        prop_assert_eq!(
            Classifier::default().classify(status, &body, &handle()),
            ClassifiedOutcome::AsyncStarted(handle())
        );
    }

    /// Whatever JSON the engine answers with is passed through unchanged
    #[test]
    fn prop_json_success_is_passed_through(value in arbitrary_json_strategy()) {
        let body = serde_json::to_string(&value).unwrap();
        prop_assert_eq!(
            Classifier::default().classify(200, &body, &handle()),
            ClassifiedOutcome::SyncSuccess(value)
        );
    }
}

// =============================================================================
// Handles and submissions
// =============================================================================

proptest! {
    #[test]
    fn prop_numeric_token_is_trailing_digits(client in "[a-z_]{0,12}", digits in "[0-9]{1,16}") {
        let handle = format!("{}_{}", client, digits);
        prop_assert_eq!(numeric_token(&handle), Some(digits.as_str()));
    }

    #[test]
    fn prop_non_numeric_tail_has_no_token(handle in "[a-z0-9_]{0,12}_[0-9]{0,4}[a-z][a-z0-9]{0,4}") {
        prop_assert_eq!(numeric_token(&handle), None);
    }

    /// Arbitrary payloads always yield a usable request
    #[test]
    fn fuzz_work_request_from_payload(payload in submission_strategy()) {
        let request = WorkRequest::from_payload(payload.clone(), &PayloadFields::default());

        prop_assert!(!request.subject_key.is_empty());
        prop_assert!(request.handle.as_str().contains('_'));
        prop_assert_eq!(request.payload, payload);
    }

    #[test]
    fn prop_handle_is_client_and_timestamp(client in "[a-z]{1,12}", ts in any::<u64>()) {
        let payload = json!({"lesseeName": client.clone(), "timestamp": ts});
        let request = WorkRequest::from_payload(payload, &PayloadFields::default());
        prop_assert_eq!(request.handle.as_str(), format!("{}_{}", client, ts));
    }
}
