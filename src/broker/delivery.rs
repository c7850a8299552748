// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Inbound channels that carry a deferred result back to the broker.
//!
//! | Channel          | Registry            | Cache                              |
//! |------------------|---------------------|------------------------------------|
//! | result push      | id + token fan-out  | subject, `request_{id}`            |
//! | callback (GET)   | id                  | subject                            |
//! | callback push    | id                  | -                                  |
//! | manual           | id                  | -                                  |
//!
//! Storage failures are logged and skipped; an upstream delivering a result
//! always gets an acknowledgement.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{Broker, DeliveryAck};
use crate::registry::{now_millis, CompletionSource, RegistryEntry};
use crate::tier::request_key;

impl Broker {
    /// Result pushed by the upstream under its own id.
    ///
    /// The engine frequently reports under the bare timestamp rather than the
    /// full handle, so every registry key containing `id` is completed too.
    #[tracing::instrument(skip(self, result))]
    pub async fn deliver_result(&self, id: &str, result: Value) -> DeliveryAck {
        let direct = self.complete_entry(id, result.clone(), CompletionSource::ResultPush, None).await;
        let matched = self.fan_out(id, &result).await;

        let subject = direct
            .and_then(|e| e.subject_key)
            .or_else(|| matched.iter().find_map(|(_, e)| e.subject_key.clone()))
            .unwrap_or_else(|| self.fields.default_subject_key());

        self.cache.set(&subject, &result).await;
        self.cache.set(&request_key(id), &result).await;

        let matched: Vec<String> = matched.into_iter().map(|(key, _)| key).collect();
        info!(subject = %subject, matched = matched.len(), "Result delivered");
        crate::metrics::record_delivery(CompletionSource::ResultPush.as_str(), matched.len());
        DeliveryAck::received(id, matched)
    }

    /// Result carried in the query string of a GET callback.
    #[tracing::instrument(skip(self, result))]
    pub async fn deliver_callback(&self, id: &str, result: Value) -> DeliveryAck {
        let entry = self.complete_entry(id, result.clone(), CompletionSource::Callback, None).await;
        let subject = entry
            .and_then(|e| e.subject_key)
            .unwrap_or_else(|| self.fields.default_subject_key());

        self.cache.set(&subject, &result).await;

        info!(subject = %subject, "Callback result delivered");
        crate::metrics::record_delivery(CompletionSource::Callback.as_str(), 0);
        DeliveryAck::received(id, Vec::new())
    }

    /// Legacy POST callback: registry only.
    #[tracing::instrument(skip(self, result))]
    pub async fn record_push(&self, id: &str, result: Value) -> DeliveryAck {
        self.complete_entry(id, result, CompletionSource::CallbackPush, None).await;
        crate::metrics::record_delivery(CompletionSource::CallbackPush.as_str(), 0);
        DeliveryAck::received(id, Vec::new())
    }

    /// Operator override. Without a body the entry is completed with a
    /// placeholder that records when and how it was closed.
    #[tracing::instrument(skip(self, result))]
    pub async fn complete_manually(&self, id: &str, result: Option<Value>) -> DeliveryAck {
        let result = result.unwrap_or_else(|| {
            json!({
                "success": true,
                "completedManually": true,
                "timestamp": now_millis(),
            })
        });
        self.complete_entry(id, result, CompletionSource::Manual, None).await;

        info!("Request manually marked as completed");
        crate::metrics::record_delivery(CompletionSource::Manual.as_str(), 0);
        DeliveryAck {
            message: "Request marked as completed".to_string(),
            ..DeliveryAck::received(id, Vec::new())
        }
    }

    async fn complete_entry(
        &self,
        key: &str,
        result: Value,
        source: CompletionSource,
        matched_from: Option<String>,
    ) -> Option<RegistryEntry> {
        match self.registry.complete(key, result, source, matched_from).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, source = %source, error = %e, "Failed to record completion");
                None
            }
        }
    }

    /// Complete every other registry key that embeds `id` (`acme_17` for `17`).
    async fn fan_out(&self, id: &str, result: &Value) -> Vec<(String, RegistryEntry)> {
        if id.is_empty() {
            return Vec::new();
        }

        let keys = match self.registry.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(id, error = %e, "Registry key listing failed, skipping token fan-out");
                return Vec::new();
            }
        };

        let mut matched = Vec::new();
        // `ends_with("_{id}")` is a special case of `contains`, kept for intent
        for key in keys
            .into_iter()
            .filter(|k| k != id && (k.ends_with(&format!("_{}", id)) || k.contains(id)))
        {
            debug!(key = %key, id, "Completing token-matched entry");
            if let Some(entry) = self
                .complete_entry(&key, result.clone(), CompletionSource::ResultPush, Some(id.to_string()))
                .await
            {
                matched.push((key, entry));
            }
        }
        matched
    }
}
