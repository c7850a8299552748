// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two-level result cache.
//!
//! ```text
//!   get(key)                         set(key, value)
//!      │                                  │
//!      ▼                                  ▼
//! ┌──────────────┐  miss / failure  ┌──────────────┐
//! │ Primary      │ ───────────────▶ │ Primary      │  (skipped once downgraded)
//! │ (Redis)      │                  │ (Redis)      │
//! └──────────────┘                  └──────────────┘
//!      │                                  │ always
//!      ▼                                  ▼
//! ┌──────────────┐                  ┌──────────────┐
//! │ Local        │                  │ Local        │  superset mirror
//! │ (DashMap)    │                  │ (DashMap)    │
//! └──────────────┘                  └──────────────┘
//! ```
//!
//! The first transport failure on the primary marks it unavailable for the
//! rest of the process lifetime; there is no reconnect. Failures are logged
//! and counted, never returned to callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::storage::memory::InMemoryStore;
use crate::storage::redis::RedisStore;
use crate::storage::traits::{CacheStore, StorageError};

/// Case-fold and trim, so cosmetic variation maps to one entry.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Request-scoped cache key (`request_{id}`).
#[must_use]
pub fn request_key(id: &str) -> String {
    format!("request_{}", id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSource {
    #[serde(rename = "Redis + Memory")]
    PrimaryAndLocal,
    #[serde(rename = "Memory Only")]
    LocalOnly,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryAndLocal => write!(f, "Redis + Memory"),
            Self::LocalOnly => write!(f, "Memory Only"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_keys: usize,
    pub keys: Vec<String>,
    pub source: CacheSource,
}

pub struct CacheTier {
    primary: Option<Arc<dyn CacheStore>>,
    primary_available: AtomicBool,
    local: InMemoryStore,
}

impl CacheTier {
    /// Local-only tier (no shared primary configured).
    #[must_use]
    pub fn local_only(max_local_entries: Option<usize>) -> Self {
        crate::metrics::set_primary_available(false);
        Self {
            primary: None,
            primary_available: AtomicBool::new(false),
            local: InMemoryStore::bounded(max_local_entries),
        }
    }

    #[must_use]
    pub fn with_primary(primary: Arc<dyn CacheStore>, max_local_entries: Option<usize>) -> Self {
        crate::metrics::set_primary_available(true);
        Self {
            primary: Some(primary),
            primary_available: AtomicBool::new(true),
            local: InMemoryStore::bounded(max_local_entries),
        }
    }

    /// Connect to Redis if a URL is given; an unreachable primary at startup
    /// yields a local-only tier rather than an error.
    pub async fn connect(redis_url: Option<&str>, prefix: &str, max_local_entries: Option<usize>) -> Self {
        let Some(url) = redis_url else {
            info!("No Redis URL configured - result cache is memory only");
            return Self::local_only(max_local_entries);
        };

        match RedisStore::with_prefix(url, Some(prefix)).await {
            Ok(store) => {
                info!(prefix = %prefix, "Redis cache connected");
                Self::with_primary(Arc::new(store), max_local_entries)
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, using in-memory cache fallback");
                crate::metrics::record_primary_downgrade("connect");
                Self::local_only(max_local_entries)
            }
        }
    }

    #[must_use]
    pub fn is_primary_available(&self) -> bool {
        self.primary.is_some() && self.primary_available.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn source(&self) -> CacheSource {
        if self.is_primary_available() {
            CacheSource::PrimaryAndLocal
        } else {
            CacheSource::LocalOnly
        }
    }

    /// Number of entries in the local mirror
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    fn active_primary(&self) -> Option<&Arc<dyn CacheStore>> {
        self.primary.as_ref().filter(|_| self.is_primary_available())
    }

    fn downgrade(&self, operation: &str, error: &StorageError) {
        // Only the first failure logs; later ones race on an already-false flag
        if self.primary_available.swap(false, Ordering::AcqRel) {
            warn!(operation, error = %error, "Cache primary failed, continuing with in-memory cache only");
            crate::metrics::record_primary_downgrade(operation);
        }
    }

    #[tracing::instrument(skip(self), fields(tier))]
    pub async fn get(&self, key: &str) -> Option<Value> {
        let key = normalize_key(key);

        if let Some(primary) = self.active_primary() {
            match primary.get(&key).await {
                Ok(Some(value)) => {
                    tracing::Span::current().record("tier", primary.name());
                    debug!("Primary cache hit");
                    crate::metrics::record_cache_lookup(primary.name(), "hit");
                    return Some(value);
                }
                Ok(None) => {
                    crate::metrics::record_cache_lookup(primary.name(), "miss");
                }
                Err(e) => {
                    crate::metrics::record_cache_lookup(primary.name(), "error");
                    self.downgrade("get", &e);
                }
            }
        }

        match self.local.get_value(&key) {
            Some(value) => {
                tracing::Span::current().record("tier", "memory");
                debug!("Memory cache hit");
                crate::metrics::record_cache_lookup("memory", "hit");
                Some(value)
            }
            None => {
                tracing::Span::current().record("tier", "miss");
                debug!("Cache miss");
                crate::metrics::record_cache_lookup("memory", "miss");
                None
            }
        }
    }

    #[tracing::instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &Value) {
        let key = normalize_key(key);

        if let Some(primary) = self.active_primary() {
            match primary.put(&key, value).await {
                Ok(()) => crate::metrics::record_cache_write(primary.name(), "success"),
                Err(e) => {
                    crate::metrics::record_cache_write(primary.name(), "error");
                    self.downgrade("set", &e);
                }
            }
        }

        self.local.insert(&key, value.clone());
        crate::metrics::record_cache_write("memory", "success");
        debug!(key = %key, "Cached result");
    }

    /// Union of primary and local keys.
    ///
    /// A primary failure here is logged but does not downgrade the tier.
    pub async fn stats(&self) -> CacheStats {
        let mut keys = self.local.key_list();

        if let Some(primary) = self.active_primary() {
            match primary.keys().await {
                Ok(primary_keys) => keys.extend(primary_keys),
                Err(e) => warn!(error = %e, "Cache primary key listing failed"),
            }
        }

        keys.sort();
        keys.dedup();

        CacheStats {
            total_keys: keys.len(),
            keys,
            source: self.source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Primary that fails every call and counts attempts.
    struct DeadPrimary {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for DeadPrimary {
        fn name(&self) -> &'static str {
            "dead"
        }
        async fn get(&self, _key: &str) -> Result<Option<Value>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Backend("connection refused".into()))
        }
        async fn put(&self, _key: &str, _value: &Value) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Backend("connection refused".into()))
        }
        async fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Backend("connection refused".into()))
        }
    }

    /// Healthy primary that accepts writes and then loses them (eviction, flush).
    struct ForgetfulPrimary {
        gets: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for ForgetfulPrimary {
        fn name(&self) -> &'static str {
            "forgetful"
        }
        async fn get(&self, _key: &str) -> Result<Option<Value>, StorageError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
        async fn put(&self, _key: &str, _value: &Value) -> Result<(), StorageError> {
            Ok(())
        }
        async fn keys(&self) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Volvo A30G Articulating Dump "), "volvo a30g articulating dump");
        assert_eq!(normalize_key(&request_key("ACME_17")), "request_acme_17");
    }

    #[tokio::test]
    async fn test_local_only_round_trip_with_cosmetic_variation() {
        let tier = CacheTier::local_only(None);
        tier.set("Volvo A30G ", &json!({"estimatedValue": "$365,580"})).await;

        assert_eq!(tier.get("volvo a30g").await, Some(json!({"estimatedValue": "$365,580"})));
        assert_eq!(tier.source(), CacheSource::LocalOnly);
    }

    #[tokio::test]
    async fn test_primary_hit_skips_local() {
        let primary = Arc::new(InMemoryStore::new());
        primary.insert("bell b60e", json!({"from": "primary"}));
        let tier = CacheTier::with_primary(primary, None);

        assert_eq!(tier.get("Bell B60E").await, Some(json!({"from": "primary"})));
        assert_eq!(tier.local_len(), 0);
    }

    #[tokio::test]
    async fn test_set_mirrors_into_local() {
        let primary = Arc::new(InMemoryStore::new());
        let tier = CacheTier::with_primary(primary.clone(), None);
        tier.set("request_17", &json!(1)).await;

        assert_eq!(primary.get_value("request_17"), Some(json!(1)));
        assert_eq!(tier.local_len(), 1);
    }

    #[tokio::test]
    async fn test_primary_failure_downgrades_permanently() {
        let dead = Arc::new(DeadPrimary { calls: AtomicUsize::new(0) });
        let tier = CacheTier::with_primary(dead.clone(), None);
        assert!(tier.is_primary_available());

        tier.set("volvo a30g", &json!({"v": 1})).await;
        assert!(!tier.is_primary_available());
        assert_eq!(dead.calls.load(Ordering::SeqCst), 1);

        // Served from the local mirror, primary never retried
        assert_eq!(tier.get("volvo a30g").await, Some(json!({"v": 1})));
        assert_eq!(dead.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tier.stats().await.source, CacheSource::LocalOnly);
    }

    #[tokio::test]
    async fn test_primary_miss_falls_back_to_local_mirror() {
        let primary = Arc::new(ForgetfulPrimary { gets: AtomicUsize::new(0) });
        let tier = CacheTier::with_primary(primary.clone(), None);

        tier.set("Bell B60E", &json!({"residualAnalysis": "64%"})).await;

        assert_eq!(tier.get("bell b60e").await, Some(json!({"residualAnalysis": "64%"})));
        assert_eq!(primary.gets.load(Ordering::SeqCst), 1);
        // A miss is not a failure
        assert!(tier.is_primary_available());
        assert_eq!(tier.source(), CacheSource::PrimaryAndLocal);
    }

    #[tokio::test]
    async fn test_stats_union_and_source() {
        let primary = Arc::new(InMemoryStore::new());
        primary.insert("only in primary", json!(1));
        let tier = CacheTier::with_primary(primary, None);
        tier.set("both", &json!(2)).await;

        let stats = tier.stats().await;
        assert_eq!(stats.keys, vec!["both", "only in primary"]);
        assert_eq!(stats.total_keys, 2);
        assert_eq!(stats.source, CacheSource::PrimaryAndLocal);

        let wire = serde_json::to_value(&stats).unwrap();
        assert_eq!(wire["totalKeys"], 2);
        assert_eq!(wire["source"], "Redis + Memory");
    }
}
