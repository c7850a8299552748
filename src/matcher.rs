// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Status reconciliation for tracking handles.
//!
//! The engine does not reliably echo the handle it was given: it may report
//! back under the bare timestamp, or only write the result to the shared
//! cache. A status query therefore walks a fixed sequence of stages and
//! answers from the first that knows anything:
//!
//! ```text
//! 1. registry[handle]                      exact
//! 2. registry[k] where k == token          token = digits after the last '_'
//!    or k contains token                   (exact-token key preferred)
//! 3. cache["request_{handle}"]
//! 4. cache["request_{token}"]
//! 5. cache[subject] for each fallback subject, in order
//! ```
//!
//! A `processing` registry entry is a hit: it stops the walk and reports
//! `pending`, even if a later stage would find a completed result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::registry::{now_millis, RegistryEntry};
use crate::storage::traits::RegistryStore;
use crate::tier::{request_key, CacheTier};

/// Trailing all-digit segment after the last `_`, e.g. `acme_17` → `17`.
#[must_use]
pub fn numeric_token(handle: &str) -> Option<&str> {
    let (_, tail) = handle.rsplit_once('_')?;
    (!tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit())).then_some(tail)
}

/// Stage that answered a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Registry,
    RegistryTokenMatch,
    CacheFallbackByRequestId,
    CacheFallbackByTimestamp,
    CacheFallbackBySubject,
}

impl MatchSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::RegistryTokenMatch => "registry_token_match",
            Self::CacheFallbackByRequestId => "cache_fallback_by_request_id",
            Self::CacheFallbackByTimestamp => "cache_fallback_by_timestamp",
            Self::CacheFallbackBySubject => "cache_fallback_by_subject",
        }
    }
}

/// Answer to a status query, serialized as `{"status": "pending" | "completed", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusReport {
    Pending {
        #[serde(rename = "startedAt", default, skip_serializing_if = "Option::is_none")]
        started_at: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<MatchSource>,
    },
    Completed {
        #[serde(default)]
        result: Value,
        #[serde(rename = "completedAt", default, skip_serializing_if = "Option::is_none")]
        completed_at: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<MatchSource>,
    },
}

impl StatusReport {
    /// Nothing known about the handle yet
    #[must_use]
    pub fn unknown() -> Self {
        Self::Pending {
            started_at: None,
            source: None,
        }
    }

    fn from_entry(entry: RegistryEntry, source: MatchSource) -> Self {
        if entry.is_completed() {
            Self::Completed {
                result: entry.result.unwrap_or(Value::Null),
                completed_at: entry.completed_at,
                source: Some(source),
            }
        } else {
            Self::Pending {
                started_at: entry.started_at,
                source: Some(source),
            }
        }
    }

    fn from_cache(result: Value, source: MatchSource) -> Self {
        Self::Completed {
            result,
            completed_at: Some(now_millis()),
            source: Some(source),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub fn source(&self) -> Option<MatchSource> {
        match self {
            Self::Pending { source, .. } | Self::Completed { source, .. } => *source,
        }
    }
}

pub struct Matcher {
    registry: Arc<dyn RegistryStore>,
    cache: Arc<CacheTier>,
    fallback_subjects: Vec<String>,
}

impl Matcher {
    pub fn new(registry: Arc<dyn RegistryStore>, cache: Arc<CacheTier>, fallback_subjects: Vec<String>) -> Self {
        Self {
            registry,
            cache,
            fallback_subjects,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, handle: &str) -> StatusReport {
        let report = self.walk(handle).await;
        let stage = report.source().map_or("none", |s| s.as_str());
        debug!(stage, completed = report.is_completed(), "Status reconciled");
        crate::metrics::record_reconciliation(stage);
        report
    }

    async fn walk(&self, handle: &str) -> StatusReport {
        if let Some(entry) = self.registry_entry(handle).await {
            return StatusReport::from_entry(entry, MatchSource::Registry);
        }

        let token = numeric_token(handle);

        if let Some(token) = token {
            if let Some(entry) = self.token_entry(token).await {
                return StatusReport::from_entry(entry, MatchSource::RegistryTokenMatch);
            }
        }

        if let Some(result) = self.cache.get(&request_key(handle)).await {
            return StatusReport::from_cache(result, MatchSource::CacheFallbackByRequestId);
        }

        if let Some(token) = token {
            if let Some(result) = self.cache.get(&request_key(token)).await {
                return StatusReport::from_cache(result, MatchSource::CacheFallbackByTimestamp);
            }
        }

        for subject in &self.fallback_subjects {
            if let Some(result) = self.cache.get(subject).await {
                return StatusReport::from_cache(result, MatchSource::CacheFallbackBySubject);
            }
        }

        StatusReport::unknown()
    }

    /// Registry read; a failing backend counts as a miss so later stages still run.
    async fn registry_entry(&self, handle: &str) -> Option<RegistryEntry> {
        match self.registry.get(handle).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(handle, error = %e, "Registry lookup failed");
                None
            }
        }
    }

    async fn token_entry(&self, token: &str) -> Option<RegistryEntry> {
        let mut keys = match self.registry.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(token, error = %e, "Registry key listing failed");
                return None;
            }
        };
        keys.sort();

        let key = keys
            .iter()
            .find(|k| k.as_str() == token)
            .or_else(|| keys.iter().find(|k| k.contains(token)))?;
        debug!(token, key = %key, "Registry token match");
        self.registry_entry(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CompletionSource, InMemoryRegistry};
    use serde_json::json;

    fn setup(fallback: &[&str]) -> (Arc<InMemoryRegistry>, Arc<CacheTier>, Matcher) {
        let registry = Arc::new(InMemoryRegistry::unbounded());
        let cache = Arc::new(CacheTier::local_only(None));
        let matcher = Matcher::new(
            registry.clone(),
            cache.clone(),
            fallback.iter().map(|s| s.to_string()).collect(),
        );
        (registry, cache, matcher)
    }

    #[test]
    fn test_numeric_token() {
        assert_eq!(numeric_token("acme_1700000000000"), Some("1700000000000"));
        assert_eq!(numeric_token("acme_corp_42"), Some("42"));
        assert_eq!(numeric_token("acme_v2"), None);
        assert_eq!(numeric_token("acme_"), None);
        assert_eq!(numeric_token("1700000000000"), None);
    }

    #[tokio::test]
    async fn test_unknown_handle_is_pending() {
        let (_, _, matcher) = setup(&[]);
        let report = matcher.reconcile("acme_1").await;

        assert_eq!(report, StatusReport::unknown());
        assert_eq!(serde_json::to_value(&report).unwrap(), json!({"status": "pending"}));
    }

    #[tokio::test]
    async fn test_processing_entry_beats_cached_token_result() {
        let (registry, cache, matcher) = setup(&[]);
        registry.put("acme_17", RegistryEntry::processing("volvo a30g")).await.unwrap();
        cache.set(&request_key("17"), &json!({"stale": true})).await;

        let report = matcher.reconcile("acme_17").await;
        assert!(!report.is_completed());
        assert_eq!(report.source(), Some(MatchSource::Registry));
    }

    #[tokio::test]
    async fn test_token_match_prefers_exact_token_key() {
        let (registry, _, matcher) = setup(&[]);
        registry
            .complete("a_17_x", json!({"from": "contains"}), CompletionSource::ResultPush, None)
            .await
            .unwrap();
        registry
            .complete("17", json!({"from": "exact"}), CompletionSource::ResultPush, None)
            .await
            .unwrap();

        let StatusReport::Completed { result, source, .. } = matcher.reconcile("acme_17").await else {
            panic!("expected completed");
        };
        assert_eq!(result, json!({"from": "exact"}));
        assert_eq!(source, Some(MatchSource::RegistryTokenMatch));
    }

    #[tokio::test]
    async fn test_token_match_by_containment() {
        let (registry, _, matcher) = setup(&[]);
        registry
            .complete("globex_17", json!({"ok": 1}), CompletionSource::ResultPush, None)
            .await
            .unwrap();

        let report = matcher.reconcile("acme_17").await;
        assert_eq!(report.source(), Some(MatchSource::RegistryTokenMatch));
    }

    #[tokio::test]
    async fn test_cache_request_id_before_token_before_subject() {
        let (_, cache, matcher) = setup(&["volvo a30g"]);
        cache.set("volvo a30g", &json!({"stage": 5})).await;
        assert_eq!(matcher.reconcile("acme_17").await.source(), Some(MatchSource::CacheFallbackBySubject));

        cache.set(&request_key("17"), &json!({"stage": 4})).await;
        assert_eq!(matcher.reconcile("acme_17").await.source(), Some(MatchSource::CacheFallbackByTimestamp));

        cache.set(&request_key("acme_17"), &json!({"stage": 3})).await;
        let StatusReport::Completed { result, source, completed_at } = matcher.reconcile("acme_17").await else {
            panic!("expected completed");
        };
        assert_eq!(result, json!({"stage": 3}));
        assert_eq!(source, Some(MatchSource::CacheFallbackByRequestId));
        assert!(completed_at.is_some());
    }

    #[tokio::test]
    async fn test_non_numeric_handle_skips_token_stages() {
        let (registry, cache, matcher) = setup(&[]);
        registry
            .complete("abc", json!(1), CompletionSource::Manual, None)
            .await
            .unwrap();
        cache.set(&request_key("abc"), &json!(2)).await;

        // "acme_abc" has no numeric token, so neither "abc" entry is consulted
        assert_eq!(matcher.reconcile("acme_abc").await, StatusReport::unknown());
    }

    #[tokio::test]
    async fn test_completed_report_wire_shape() {
        let (registry, _, matcher) = setup(&[]);
        registry
            .complete("acme_1", json!({"v": 1}), CompletionSource::ResultPush, None)
            .await
            .unwrap();

        let wire = serde_json::to_value(matcher.reconcile("acme_1").await).unwrap();
        assert_eq!(wire["status"], "completed");
        assert_eq!(wire["result"], json!({"v": 1}));
        assert_eq!(wire["source"], "registry");
        assert!(wire["completedAt"].is_u64());
    }
}
