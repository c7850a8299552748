// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::{now_millis, CompletionSource, RegistryEntry, RetentionPolicy};
use crate::storage::traits::{RegistryStore, StorageError};

/// Process-local registry.
///
/// Writes are per-key atomic (DashMap shard locks), which is all the
/// dispatch-start / result-arrival workflow needs. In-flight state is lost on
/// restart and invisible to other instances; use [`super::RedisRegistry`]
/// when either matters.
pub struct InMemoryRegistry {
    entries: DashMap<String, RegistryEntry>,
    retention: RetentionPolicy,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(RetentionPolicy::unbounded())
    }

    /// Evict oldest entries beyond `max_entries`, sparing `keep`.
    fn enforce_bound(&self, keep: &str) {
        let Some(max) = self.retention.max_entries else {
            return;
        };
        let mut evicted = 0;
        while self.entries.len() > max {
            let oldest = self
                .entries
                .iter()
                .filter(|r| r.key() != keep)
                .min_by_key(|r| r.value().last_touched())
                .map(|r| r.key().clone());
            let Some(key) = oldest else { break };
            self.entries.remove(&key);
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, max, "Registry over capacity, evicted oldest entries");
            crate::metrics::record_eviction("registry", evicted);
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistry {
    async fn put(&self, handle: &str, entry: RegistryEntry) -> Result<(), StorageError> {
        self.entries.insert(handle.to_string(), entry);
        self.enforce_bound(handle);
        Ok(())
    }

    async fn get(&self, handle: &str) -> Result<Option<RegistryEntry>, StorageError> {
        let now = now_millis();
        Ok(self
            .entries
            .get(handle)
            .filter(|e| !e.is_expired(self.retention.ttl, now))
            .map(|e| e.value().clone()))
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let now = now_millis();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(self.retention.ttl, now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn complete(
        &self,
        handle: &str,
        result: Value,
        source: CompletionSource,
        matched_from: Option<String>,
    ) -> Result<RegistryEntry, StorageError> {
        // Single shard lock for the whole read-modify-write
        let entry = {
            let mut slot = self
                .entries
                .entry(handle.to_string())
                .or_insert_with(|| RegistryEntry::completed(Value::Null, source));
            let updated = slot.value().clone().into_completed(result, source, matched_from);
            *slot = updated.clone();
            updated
        };
        self.enforce_bound(handle);
        Ok(entry)
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        let Some(ttl) = self.retention.ttl else {
            return Ok(0);
        };
        let now = now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(Some(ttl), now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            crate::metrics::record_eviction("registry", purged);
        }
        Ok(purged)
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.entries.len())
    }
}
