// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Upstream reply classification.
//!
//! The workflow engine answers a dispatch in one of several inconsistent
//! ways. Rules are applied in this order, first match wins:
//!
//! | # | Status            | Body                                 | Outcome          |
//! |---|-------------------|--------------------------------------|------------------|
//! | 1 | 404               | any                                  | `NotActive`      |
//! | 2 | 500               | contains [`NOT_STARTED_MARKER`]      | `HttpError` (workflow not started) |
//! | 3 | 524               | any                                  | `AsyncStarted`   |
//! | 4 | other >= 400      | any                                  | `HttpError`      |
//! | 5 | 2xx               | empty / whitespace                   | `AsyncStarted`   |
//! | 6 | 2xx               | JSON                                 | `SyncSuccess`    |
//! | 7 | 2xx               | text longer than `min_text_len`      | `SyncSuccess` (envelope) |
//! | 8 | 2xx               | short text                           | `MalformedBody`  |
//! | 9 | 1xx / 3xx         | any                                  | `HttpError`      |
//!
//! Classification is pure; cache and registry writes belong to the broker.

use serde_json::{json, Value};

use crate::broker::TrackingHandle;
use crate::registry::now_millis;

/// Body fragment the engine emits when a workflow refuses to start.
pub const NOT_STARTED_MARKER: &str = "Workflow could not be started";

/// Gateway timeout: the engine took the job but the gateway stopped waiting.
/// The broker reuses the same code towards its callers as "keep polling".
pub const KEEP_POLLING_STATUS: u16 = 524;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Upstream,
    WorkflowNotStarted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedOutcome {
    SyncSuccess(Value),
    AsyncStarted(TrackingHandle),
    NotActive,
    HttpError {
        status: u16,
        body: String,
        kind: HttpErrorKind,
    },
    MalformedBody(String),
}

impl ClassifiedOutcome {
    /// Metric/log label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::SyncSuccess(_) => "sync_success",
            Self::AsyncStarted(_) => "async_started",
            Self::NotActive => "not_active",
            Self::HttpError { .. } => "http_error",
            Self::MalformedBody(_) => "malformed_body",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    /// Non-JSON bodies at or below this many characters are not treated as a result
    pub min_text_len: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self { min_text_len: 10 }
    }
}

impl Classifier {
    #[must_use]
    pub fn new(min_text_len: usize) -> Self {
        Self { min_text_len }
    }

    #[must_use]
    pub fn classify(&self, status: u16, body: &str, handle: &TrackingHandle) -> ClassifiedOutcome {
        match status {
            404 => ClassifiedOutcome::NotActive,
            500 if body.contains(NOT_STARTED_MARKER) => ClassifiedOutcome::HttpError {
                status,
                body: body.to_string(),
                kind: HttpErrorKind::WorkflowNotStarted,
            },
            KEEP_POLLING_STATUS => ClassifiedOutcome::AsyncStarted(handle.clone()),
            400..=u16::MAX => ClassifiedOutcome::HttpError {
                status,
                body: body.to_string(),
                kind: HttpErrorKind::Upstream,
            },
            200..=299 => self.classify_success(body, handle),
            _ => ClassifiedOutcome::HttpError {
                status,
                body: body.to_string(),
                kind: HttpErrorKind::Upstream,
            },
        }
    }

    fn classify_success(&self, body: &str, handle: &TrackingHandle) -> ClassifiedOutcome {
        if body.trim().is_empty() {
            return ClassifiedOutcome::AsyncStarted(handle.clone());
        }
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return ClassifiedOutcome::SyncSuccess(value);
        }
        if body.chars().count() > self.min_text_len {
            return ClassifiedOutcome::SyncSuccess(text_envelope(body));
        }
        ClassifiedOutcome::MalformedBody(body.to_string())
    }
}

/// Wrap a plain-text analysis the way JSON results are shaped.
fn text_envelope(text: &str) -> Value {
    json!({
        "residualAnalysis": text,
        "status": "completed",
        "timestamp": now_millis(),
    })
}
