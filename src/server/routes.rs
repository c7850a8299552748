// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

use crate::broker::{Broker, DeliveryAck, HealthReport, SubmitOutcome};
use crate::matcher::StatusReport;
use crate::tier::{normalize_key, CacheStats};

pub(super) type AppState = Arc<Broker>;

/// Inbound bodies are taken as-is: JSON when it parses, text otherwise.
/// `None` for an empty body.
fn lenient_body(body: &Bytes) -> Option<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned())))
}

pub(super) async fn submit(State(broker): State<AppState>, Json(payload): Json<Value>) -> SubmitOutcome {
    broker.submit(payload).await
}

pub(super) async fn status(State(broker): State<AppState>, Path(handle): Path<String>) -> Json<StatusReport> {
    Json(broker.status(&handle).await)
}

pub(super) async fn result(
    State(broker): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Json<DeliveryAck> {
    let result = lenient_body(&body).unwrap_or(Value::Null);
    Json(broker.deliver_result(&id, result).await)
}

/// GET callback: the result travels in the `response` query parameter, or
/// the whole query string stands in for it.
pub(super) async fn callback(
    State(broker): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<DeliveryAck> {
    let result = match params.get("response") {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        None => json!(params),
    };
    debug!(id = %id, "GET callback received");
    Json(broker.deliver_callback(&id, result).await)
}

pub(super) async fn callback_push(
    State(broker): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Json<DeliveryAck> {
    let result = lenient_body(&body).unwrap_or(Value::Null);
    Json(broker.record_push(&id, result).await)
}

pub(super) async fn complete(
    State(broker): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Json<DeliveryAck> {
    Json(broker.complete_manually(&id, lenient_body(&body)).await)
}

pub(super) async fn cache_lookup(State(broker): State<AppState>, Path(key): Path<String>) -> Response {
    let key = normalize_key(&key);
    match broker.cache_lookup(&key).await {
        Some(data) => Json(json!({ "found": true, "data": data, "key": key })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "found": false,
                "key": key,
                "message": "No cached data found for this key",
            })),
        )
            .into_response(),
    }
}

pub(super) async fn cache_stats(State(broker): State<AppState>) -> Json<CacheStats> {
    Json(broker.cache_stats().await)
}

pub(super) async fn health(State(broker): State<AppState>) -> Json<HealthReport> {
    Json(broker.health().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_body() {
        assert_eq!(lenient_body(&Bytes::from_static(b"")), None);
        assert_eq!(lenient_body(&Bytes::from_static(b" \n")), None);
        assert_eq!(lenient_body(&Bytes::from_static(br#"{"a":1}"#)), Some(json!({"a": 1})));
        assert_eq!(lenient_body(&Bytes::from_static(b"plain text")), Some(json!("plain text")));
    }
}
