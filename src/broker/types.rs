// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the broker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::registry::now_millis;
use crate::tier::{normalize_key, CacheSource};

/// Client identifier used when the payload carries none
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Correlation key for deferred work: `{clientIdentifier}_{submissionTimestamp}`.
///
/// Best-effort unique; two submissions from the same client in the same
/// millisecond share a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingHandle(String);

impl TrackingHandle {
    #[must_use]
    pub fn new(client_id: &str, timestamp: &str) -> Self {
        Self(format!("{}_{}", client_id, timestamp))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TrackingHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TrackingHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for TrackingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which payload fields carry the subject, client id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFields {
    pub subject: String,
    pub client_id: String,
    pub timestamp: String,
    /// Subject used when the payload has none
    pub default_subject: String,
}

impl Default for PayloadFields {
    fn default() -> Self {
        Self::from_config(&BrokerConfig::default())
    }
}

impl PayloadFields {
    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            subject: config.subject_field.clone(),
            client_id: config.client_id_field.clone(),
            timestamp: config.timestamp_field.clone(),
            default_subject: config.default_subject.clone(),
        }
    }

    /// Normalized default subject
    #[must_use]
    pub fn default_subject_key(&self) -> String {
        normalize_key(&self.default_subject)
    }
}

/// Read a scalar payload field as text. Strings are trimmed; numbers keep
/// their JSON rendering; anything else counts as absent.
fn field_text(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One submitted unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRequest {
    /// Normalized cache key derived from the descriptive field
    pub subject_key: String,
    pub handle: TrackingHandle,
    pub payload: Value,
}

impl WorkRequest {
    #[must_use]
    pub fn from_payload(payload: Value, fields: &PayloadFields) -> Self {
        let subject = field_text(&payload, &fields.subject).unwrap_or_else(|| fields.default_subject.clone());
        let client_id = field_text(&payload, &fields.client_id).unwrap_or_else(|| ANONYMOUS_CLIENT.to_string());
        let timestamp = field_text(&payload, &fields.timestamp).unwrap_or_else(|| now_millis().to_string());

        Self {
            subject_key: normalize_key(&subject),
            handle: TrackingHandle::new(&client_id, &timestamp),
            payload,
        }
    }
}

/// What a submission resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Served from the cache tier; the upstream was not contacted
    Cached(Value),
    /// Upstream answered synchronously
    Completed(Value),
    /// Upstream accepted the job; poll this handle
    Accepted(TrackingHandle),
    Rejected(BrokerError),
    /// Upstream answered with a short non-JSON body
    Unstructured(String),
}

impl SubmitOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cached(_) => "cached",
            Self::Completed(_) => "completed",
            Self::Accepted(_) => "accepted",
            Self::Rejected(_) => "rejected",
            Self::Unstructured(_) => "unstructured",
        }
    }

    /// The result, if this outcome carries one
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Cached(v) | Self::Completed(v) => Some(v),
            _ => None,
        }
    }
}

/// Acknowledgement returned to an inbound result delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAck {
    pub success: bool,
    pub message: String,
    pub request_id: String,
    /// Other registry keys completed by token match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
}

impl DeliveryAck {
    pub fn received(request_id: impl Into<String>, matched: Vec<String>) -> Self {
        Self {
            success: true,
            message: "Result received".to_string(),
            request_id: request_id.into(),
            matched,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub cache: CacheSource,
    pub registry_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_work_request_from_full_payload() {
        let request = WorkRequest::from_payload(
            json!({
                "lesseeName": "ACME",
                "timestamp": 1700000000000u64,
                "itemDescription": "  Volvo A30G Articulating Dump "
            }),
            &PayloadFields::default(),
        );

        assert_eq!(request.subject_key, "volvo a30g articulating dump");
        assert_eq!(request.handle.as_str(), "ACME_1700000000000");
    }

    #[test]
    fn test_work_request_defaults() {
        let request = WorkRequest::from_payload(json!({}), &PayloadFields::default());

        assert_eq!(request.subject_key, "unknown equipment");
        assert!(request.handle.as_str().starts_with("anonymous_"));
        let (_, ts) = request.handle.as_str().rsplit_once('_').unwrap();
        assert!(ts.parse::<u64>().is_ok());
    }

    #[test]
    fn test_custom_field_names() {
        let fields = PayloadFields {
            subject: "asset".into(),
            client_id: "tenant".into(),
            timestamp: "ts".into(),
            default_subject: "none".into(),
        };
        let request = WorkRequest::from_payload(json!({"asset": "Bell B60E", "tenant": "globex", "ts": "42"}), &fields);

        assert_eq!(request.subject_key, "bell b60e");
        assert_eq!(request.handle, TrackingHandle::from("globex_42"));
    }

    #[test]
    fn test_handle_serializes_as_plain_string() {
        let handle = TrackingHandle::new("acme", "1");
        assert_eq!(serde_json::to_value(&handle).unwrap(), json!("acme_1"));
        assert_eq!(handle.to_string(), "acme_1");
    }

    #[test]
    fn test_delivery_ack_shape() {
        let ack = DeliveryAck::received("1700000000000", vec![]);
        let wire = serde_json::to_value(&ack).unwrap();
        assert_eq!(wire, json!({"success": true, "message": "Result received", "requestId": "1700000000000"}));
    }
}
