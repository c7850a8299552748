// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request registry: correlation key → in-flight or completed work.
//!
//! An entry is created as `processing` when the upstream accepts work without
//! answering, and flips to `completed` when the deferred result arrives on one
//! of the inbound channels. Two backends implement [`RegistryStore`]:
//!
//! - [`InMemoryRegistry`]: process-local, bounded by a [`RetentionPolicy`]
//! - [`RedisRegistry`]: shared across broker instances, TTL enforced by Redis
//!
//! [`RegistryStore`]: crate::storage::RegistryStore

mod memory;
mod redis;

pub use memory::InMemoryRegistry;
pub use self::redis::RedisRegistry;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Processing,
    Completed,
}

/// Inbound channel that completed an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    /// POST /work/result/{id}
    ResultPush,
    /// GET /work/callback/{id}
    Callback,
    /// POST /work/callback/{id}
    CallbackPush,
    /// Operator marked it done by hand
    Manual,
}

impl CompletionSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResultPush => "result_push",
            Self::Callback => "callback",
            Self::CallbackPush => "callback_push",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Unset for entries that were completed without a processing phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    /// Normalized subject of the originating request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_key: Option<String>,
    /// Upstream id whose delivery completed this entry by token match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CompletionSource>,
}

impl RegistryEntry {
    #[must_use]
    pub fn processing(subject_key: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Processing,
            result: None,
            started_at: Some(now_millis()),
            completed_at: None,
            subject_key: Some(subject_key.into()),
            matched_from: None,
            source: None,
        }
    }

    #[must_use]
    pub fn completed(result: Value, source: CompletionSource) -> Self {
        Self {
            status: RequestStatus::Completed,
            result: Some(result),
            started_at: None,
            completed_at: Some(now_millis()),
            subject_key: None,
            matched_from: None,
            source: Some(source),
        }
    }

    #[must_use]
    pub fn with_matched_from(mut self, matched_from: Option<String>) -> Self {
        self.matched_from = matched_from;
        self
    }

    /// Flip to completed, keeping start time and subject.
    #[must_use]
    pub fn into_completed(self, result: Value, source: CompletionSource, matched_from: Option<String>) -> Self {
        Self {
            status: RequestStatus::Completed,
            result: Some(result),
            completed_at: Some(now_millis()),
            matched_from,
            source: Some(source),
            ..self
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RequestStatus::Completed
    }

    /// Most recent write time, the basis for retention decisions.
    #[must_use]
    pub fn last_touched(&self) -> u64 {
        self.completed_at.or(self.started_at).unwrap_or(0)
    }

    #[must_use]
    pub fn is_expired(&self, ttl: Option<Duration>, now: u64) -> bool {
        match ttl {
            Some(ttl) => now.saturating_sub(self.last_touched()) > ttl.as_millis() as u64,
            None => false,
        }
    }
}

/// How long registry entries are kept.
///
/// `max_entries` bounds the map (oldest entries evicted first); `ttl` drops
/// entries whose last write is older than the duration. `None` disables
/// the respective limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    pub max_entries: Option<usize>,
    pub ttl: Option<Duration>,
}

impl RetentionPolicy {
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_processing_entry_shape() {
        let entry = RegistryEntry::processing("volvo a30g");
        assert_eq!(entry.status, RequestStatus::Processing);
        assert!(entry.result.is_none());
        assert!(entry.started_at.is_some());
        assert!(!entry.is_completed());
    }

    #[test]
    fn test_into_completed_keeps_start_and_subject() {
        let entry = RegistryEntry::processing("volvo a30g");
        let started = entry.started_at;
        let done = entry.into_completed(json!({"ok": true}), CompletionSource::ResultPush, Some("17".into()));

        assert!(done.is_completed());
        assert_eq!(done.started_at, started);
        assert_eq!(done.subject_key.as_deref(), Some("volvo a30g"));
        assert_eq!(done.matched_from.as_deref(), Some("17"));
        assert_eq!(done.source, Some(CompletionSource::ResultPush));
    }

    #[test]
    fn test_expiry_uses_last_write() {
        let mut entry = RegistryEntry::processing("x");
        entry.started_at = Some(1_000);
        let ttl = Some(Duration::from_secs(1));

        assert!(!entry.is_expired(ttl, 2_000));
        assert!(entry.is_expired(ttl, 2_001));
        assert!(!entry.is_expired(None, u64::MAX));
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = RegistryEntry::completed(json!({"a": 1}), CompletionSource::Callback);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["source"], "callback");
        assert!(value.get("completedAt").is_some());
        assert!(value.get("startedAt").is_none());
    }

    /// Metrics labels and stored `source` values are the same strings
    #[test]
    fn test_source_label_matches_wire_name() {
        for source in [
            CompletionSource::ResultPush,
            CompletionSource::Callback,
            CompletionSource::CallbackPush,
            CompletionSource::Manual,
        ] {
            assert_eq!(serde_json::to_value(source).unwrap(), source.as_str());
            assert_eq!(serde_json::from_value::<CompletionSource>(json!(source.as_str())).unwrap(), source);
        }
    }
}
