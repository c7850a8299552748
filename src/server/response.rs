// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::broker::{SubmitOutcome, TrackingHandle};
use crate::classifier::KEEP_POLLING_STATUS;
use crate::error::BrokerError;

/// Body of the keep-polling reply. `requestId` duplicates `handle` for
/// callers written against the older field name.
#[must_use]
pub fn accepted_payload(handle: &TrackingHandle) -> Value {
    json!({
        "status": KEEP_POLLING_STATUS,
        "outcome": "async_started",
        "handle": handle,
        "requestId": handle,
        "message": "Workflow started - processing in background",
    })
}

fn keep_polling() -> StatusCode {
    StatusCode::from_u16(KEEP_POLLING_STATUS).unwrap_or(StatusCode::ACCEPTED)
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_payload())).into_response()
    }
}

impl IntoResponse for SubmitOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Cached(result) | Self::Completed(result) => (StatusCode::OK, Json(result)).into_response(),
            Self::Accepted(handle) => (keep_polling(), Json(accepted_payload(&handle))).into_response(),
            Self::Rejected(error) => error.into_response(),
            Self::Unstructured(raw) => (StatusCode::OK, Json(json!({ "message": raw }))).into_response(),
        }
    }
}
