// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Outbound dispatch to the workflow engine.
//!
//! A dispatch is sent exactly once; there is no retry, since the engine may
//! already have started the job when a reply goes missing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use tracing::debug;

use crate::error::BrokerError;

/// Raw upstream answer, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: String,
}

impl UpstreamReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `payload` and return whatever came back. Only transport failures
    /// (refused, reset, timed out) are errors; any HTTP status is a reply.
    async fn dispatch(&self, payload: &Value) -> Result<UpstreamReply, BrokerError>;

    /// Target URL, echoed in error payloads
    fn endpoint(&self) -> &str;
}

#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    url: String,
}

impl HttpUpstream {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BrokerError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn dispatch(&self, payload: &Value) -> Result<UpstreamReply, BrokerError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrokerError::Network(format!("upstream timed out: {}", e))
                } else {
                    BrokerError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        debug!(status, body_len = body.len(), "Upstream replied");
        Ok(UpstreamReply { status, body })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
