// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-facing error taxonomy.
//!
//! Every variant renders to the same JSON shape
//! (`{error, errorType, errorMessage, status, ...}`), see [`BrokerError::to_payload`].

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// Upstream answered 404: the workflow endpoint is not registered
    #[error("Upstream endpoint is not active: {endpoint}")]
    NotActive { endpoint: String },

    #[error("Upstream returned HTTP {status}")]
    Http { status: u16, body: String, endpoint: String },

    /// Upstream 500 that says the workflow itself refused to start
    #[error("Upstream workflow could not be started")]
    WorkflowNotStarted { body: String },

    /// The upstream could not be reached at all (refused, reset, timed out)
    #[error("Network error: {0}")]
    Network(String),

    #[error("No result after {attempts} status queries")]
    PollingTimeout { attempts: u32 },

    #[error("Status query failed: {0}")]
    Polling(String),

    /// Structured error reported by a remote broker
    #[error("{error_type} ({status}): {message}")]
    Remote {
        status: u16,
        error_type: String,
        message: String,
    },
}

impl BrokerError {
    #[must_use]
    pub fn error_type(&self) -> &str {
        match self {
            Self::NotActive { .. } => "WebhookNotActive",
            Self::Http { .. } => "WebhookHttpError",
            Self::WorkflowNotStarted { .. } => "WorkflowStartupError",
            Self::Network(_) => "NetworkError",
            Self::PollingTimeout { .. } => "PollingTimeout",
            Self::Polling(_) => "PollingError",
            Self::Remote { error_type, .. } => error_type,
        }
    }

    /// HTTP status the broker answers with for this error.
    ///
    /// Upstream error statuses are echoed. An informational or redirect
    /// reply cannot be a final error response, so it maps to 502.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::NotActive { .. } => 404,
            Self::Http { status, .. } if (400..=599).contains(status) => *status,
            Self::Http { .. } => 502,
            Self::WorkflowNotStarted { .. } | Self::Network(_) => 500,
            Self::PollingTimeout { .. } => 504,
            Self::Polling(_) => 502,
            Self::Remote { status, .. } => *status,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::NotActive { .. } => {
                "Upstream webhook is not active. Please activate the workflow or contact the workflow owner."
                    .to_string()
            }
            Self::WorkflowNotStarted { .. } => {
                "The upstream workflow could not be started. Please check if the workflow is active and properly configured."
                    .to_string()
            }
            Self::Http { status, .. } => format!("Webhook returned HTTP {}", status),
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    fn troubleshooting(&self) -> Option<Value> {
        match self {
            Self::NotActive { .. } => Some(json!({
                "solution1": "Activate the workflow in the editor",
                "solution2": "Click 'Execute Workflow' if in test mode",
                "solution3": "Check if webhook URL is correct",
                "solution4": "Try production webhook URL without '-test' suffix",
            })),
            Self::WorkflowNotStarted { .. } => Some(json!({
                "hint": "Try activating the workflow and ensure the webhook is properly configured.",
            })),
            _ => None,
        }
    }

    /// JSON body for this error.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "error": true,
            "errorType": self.error_type(),
            "errorMessage": self.message(),
            "status": self.status(),
        });
        if let Some(map) = payload.as_object_mut() {
            match self {
                Self::NotActive { endpoint } => {
                    map.insert("webhookUrl".into(), json!(endpoint));
                }
                Self::Http { status, body, endpoint } => {
                    map.insert("upstreamStatus".into(), json!(status));
                    map.insert("responseText".into(), json!(body));
                    map.insert("webhookUrl".into(), json!(endpoint));
                }
                Self::WorkflowNotStarted { body } => {
                    map.insert("details".into(), json!(body));
                }
                Self::PollingTimeout { attempts } => {
                    map.insert("attempts".into(), json!(attempts));
                }
                _ => {}
            }
            if let Some(hints) = self.troubleshooting() {
                map.insert("troubleshooting".into(), hints);
            }
        }
        payload
    }

    /// Rebuild an error from a payload produced by [`Self::to_payload`].
    ///
    /// Returns `None` when `payload` is not a structured error.
    #[must_use]
    pub fn from_payload(status: u16, payload: &Value) -> Option<Self> {
        if payload.get("error").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        let error_type = payload.get("errorType").and_then(Value::as_str)?.to_string();
        let message = payload
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self::Remote {
            status,
            error_type,
            message,
        })
    }
}
