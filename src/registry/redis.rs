// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared registry backed by Redis.
//!
//! Every broker instance sees the same in-flight handles, so a poller routed
//! to a different instance than the one that dispatched still observes
//! completion through the registry path. Entries are JSON documents under
//! `{registry_prefix}{handle}`; the TTL half of the retention policy is
//! delegated to Redis key expiry. `max_entries` is not enforced here.

use async_trait::async_trait;
use serde_json::Value;

use super::{RegistryEntry, RetentionPolicy};
use crate::storage::redis::RedisStore;
use crate::storage::traits::{CacheStore, RegistryStore, StorageError};

pub struct RedisRegistry {
    store: RedisStore,
    retention: RetentionPolicy,
}

impl RedisRegistry {
    /// `store` should carry a namespace distinct from the result cache
    /// (`registry_prefix` vs `redis_prefix`).
    #[must_use]
    pub fn new(store: RedisStore, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    fn decode(handle: &str, value: Value) -> Result<RegistryEntry, StorageError> {
        serde_json::from_value(value).map_err(|e| StorageError::Corrupt {
            key: handle.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RegistryStore for RedisRegistry {
    async fn put(&self, handle: &str, entry: RegistryEntry) -> Result<(), StorageError> {
        let value = serde_json::to_value(&entry)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        match self.retention.ttl {
            Some(ttl) => self.store.put_with_ttl(handle, &value, ttl.as_secs().max(1)).await,
            None => CacheStore::put(&self.store, handle, &value).await,
        }
    }

    async fn get(&self, handle: &str) -> Result<Option<RegistryEntry>, StorageError> {
        CacheStore::get(&self.store, handle)
            .await?
            .map(|value| Self::decode(handle, value))
            .transpose()
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        self.store.keys().await
    }
}
