// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{CacheStore, StorageError};

struct Slot {
    value: Value,
    /// Insertion sequence, used to pick the oldest entry on overflow
    seq: u64,
}

/// Process-local result store, the always-available half of the cache tier.
///
/// Optionally bounded: once `max_entries` is exceeded the oldest-written
/// entry is evicted.
pub struct InMemoryStore {
    data: DashMap<String, Slot>,
    next_seq: AtomicU64,
    max_entries: Option<usize>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::bounded(None)
    }

    #[must_use]
    pub fn bounded(max_entries: Option<usize>) -> Self {
        Self {
            data: DashMap::new(),
            next_seq: AtomicU64::new(0),
            max_entries,
        }
    }

    /// Get current item count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|slot| slot.value.clone())
    }

    pub fn insert(&self, key: &str, value: Value) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.data.insert(key.to_string(), Slot { value, seq });
        self.enforce_bound(key);
    }

    #[must_use]
    pub fn key_list(&self) -> Vec<String> {
        self.data.iter().map(|r| r.key().clone()).collect()
    }

    /// Evict oldest entries until within bound, never the key just written.
    fn enforce_bound(&self, keep: &str) -> usize {
        let Some(max) = self.max_entries else {
            return 0;
        };
        let mut evicted = 0;
        while self.data.len() > max {
            let oldest = self
                .data
                .iter()
                .filter(|r| r.key() != keep)
                .min_by_key(|r| r.value().seq)
                .map(|r| r.key().clone());
            match oldest {
                Some(key) => {
                    self.data.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            crate::metrics::record_eviction("cache_local", evicted);
        }
        evicted
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.get_value(key))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.insert(key, value.clone());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.key_list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        store.put("volvo a30g", &json!({"estimatedValue": 365580})).await.unwrap();

        let result = store.get("volvo a30g").await.unwrap();
        assert_eq!(result, Some(json!({"estimatedValue": 365580})));
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryStore::new();
        store.put("same", &json!({"version": 1})).await.unwrap();
        store.put("same", &json!({"version": 2})).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_value("same").unwrap()["version"], 2);
    }

    #[tokio::test]
    async fn test_bounded_store_evicts_oldest() {
        let store = InMemoryStore::bounded(Some(2));
        store.insert("a", json!(1));
        store.insert("b", json!(2));
        store.insert("c", json!(3));

        assert_eq!(store.len(), 2);
        assert!(store.get_value("a").is_none());
        assert_eq!(store.get_value("b"), Some(json!(2)));
        assert_eq!(store.get_value("c"), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_rewrite_refreshes_age() {
        let store = InMemoryStore::bounded(Some(2));
        store.insert("a", json!(1));
        store.insert("b", json!(2));
        store.insert("a", json!(1));
        store.insert("c", json!(3));

        assert!(store.get_value("b").is_none());
        assert!(store.get_value("a").is_some());
    }

    #[tokio::test]
    async fn test_keys_lists_everything() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.insert(&format!("request_{}", i), json!(i));
        }
        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["request_0", "request_1", "request_2", "request_3", "request_4"]);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store_clone
                        .put(&format!("batch-{}-item-{}", batch, i), &json!({"i": i}))
                        .await
                        .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
