// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP client for a remote broker.
//!
//! Drives the whole caller-side contract: submit, then poll the returned
//! handle until the result arrives or the attempt ceiling is reached.
//!
//! ```rust,no_run
//! use response_broker::client::BrokerClient;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BrokerClient::new("http://localhost:5000")?;
//! let state = client
//!     .submit_and_wait(json!({"lesseeName": "acme", "itemDescription": "Volvo A30G"}))
//!     .await;
//! let result = state.into_result()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::broker::TrackingHandle;
use crate::classifier::KEEP_POLLING_STATUS;
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::matcher::StatusReport;
use crate::poller::{PollConfig, PollState, Poller, StatusSource};
use crate::registry::now_millis;

/// Per-request bound; above the broker's own upstream timeout so the broker
/// answers first.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(130);

#[derive(Clone)]
pub struct BrokerClient {
    client: reqwest::Client,
    base_url: Url,
    timestamp_field: String,
    poll: PollConfig,
}

impl BrokerClient {
    pub fn new(base_url: &str) -> Result<Self, BrokerError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, BrokerError> {
        let base_url = Url::parse(base_url).map_err(|e| BrokerError::Network(format!("invalid broker URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BrokerError::Network(format!("invalid broker URL: {}", base_url)));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timestamp_field: "timestamp".to_string(),
            poll: PollConfig::default(),
        })
    }

    /// Client for a broker running with `config`: same polling cadence and
    /// timestamp field, and a request timeout just above the broker's own
    /// upstream timeout.
    pub fn from_config(base_url: &str, config: &BrokerConfig) -> Result<Self, BrokerError> {
        let timeout = config.upstream_timeout() + Duration::from_secs(10);
        Ok(Self::with_timeout(base_url, timeout)?
            .with_poll_config(PollConfig::from_config(config))
            .with_timestamp_field(config.timestamp_field.clone()))
    }

    #[must_use]
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Payload field stamped with the submission time when absent
    #[must_use]
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// `Submitting` step: post the work and map the reply onto the next state.
    ///
    /// Returns `Completed` for a direct result, `Waiting` for the keep-polling
    /// signal, `Failed` otherwise.
    pub async fn submit(&self, mut payload: Value) -> PollState {
        if let Some(map) = payload.as_object_mut() {
            map.entry(self.timestamp_field.clone()).or_insert_with(|| json!(now_millis()));
        }

        let response = match self
            .client
            .post(self.endpoint(&["work"]))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return PollState::Failed {
                    error: BrokerError::Network(e.to_string()),
                }
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return PollState::Failed {
                    error: BrokerError::Network(e.to_string()),
                }
            }
        };
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        debug!(status, "Broker replied to submission");

        match status {
            200 => PollState::Completed { result: body, attempts: 0 },
            KEEP_POLLING_STATUS => match handle_of(&body) {
                Some(handle) => PollState::Waiting { handle, attempts: 0 },
                None => PollState::Failed {
                    error: BrokerError::Polling("keep-polling reply without a handle".to_string()),
                },
            },
            _ => PollState::Failed {
                error: BrokerError::from_payload(status, &body).unwrap_or_else(|| BrokerError::Remote {
                    status,
                    error_type: "HttpError".to_string(),
                    message: body.to_string(),
                }),
            },
        }
    }

    /// Full session: `Idle → Submitting → Waiting → terminal`.
    pub async fn submit_and_wait(&self, payload: Value) -> PollState {
        match self.submit(payload).await {
            PollState::Waiting { handle, .. } => {
                info!(handle = %handle, "Work accepted, polling for result");
                Poller::new(self, self.poll).wait(handle).await
            }
            other => other,
        }
    }

    /// `base_url` extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn handle_of(body: &Value) -> Option<TrackingHandle> {
    body.get("handle")
        .or_else(|| body.get("requestId"))
        .and_then(Value::as_str)
        .map(TrackingHandle::from)
}

#[async_trait]
impl StatusSource for BrokerClient {
    async fn query_status(&self, handle: &str) -> Result<StatusReport, BrokerError> {
        let response = self
            .client
            .get(self.endpoint(&["work", "status", handle]))
            .send()
            .await
            .map_err(|e| BrokerError::Polling(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrokerError::Polling(format!(
                "status endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .json::<StatusReport>()
            .await
            .map_err(|e| BrokerError::Polling(e.to_string()))
    }
}
