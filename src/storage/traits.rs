// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::registry::{CompletionSource, RegistryEntry};

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Stored value for '{key}' is not valid JSON: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Key/value store holding completed results.
///
/// Keys arrive already normalized by the cache tier; stores must not
/// transform them further.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs and metrics ("redis", "memory")
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// All keys currently held (without any namespace prefix).
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Correlation-key store for in-flight and completed work.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn put(&self, handle: &str, entry: RegistryEntry) -> Result<(), StorageError>;
    async fn get(&self, handle: &str) -> Result<Option<RegistryEntry>, StorageError>;
    async fn list_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Mark `handle` completed with `result`, keeping what is already known
    /// about it (start time, subject). Creates the entry if absent.
    ///
    /// Default implementation is a get-then-put; backends with an atomic
    /// read-modify-write should override it.
    async fn complete(
        &self,
        handle: &str,
        result: Value,
        source: CompletionSource,
        matched_from: Option<String>,
    ) -> Result<RegistryEntry, StorageError> {
        let entry = match self.get(handle).await? {
            Some(existing) => existing.into_completed(result, source, matched_from),
            None => RegistryEntry::completed(result, source).with_matched_from(matched_from),
        };
        self.put(handle, entry.clone()).await?;
        Ok(entry)
    }

    /// Drop entries past their retention. Returns how many were removed.
    /// Backends that expire natively can keep the default.
    async fn purge_expired(&self) -> Result<usize, StorageError> {
        Ok(0)
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.list_keys().await?.len())
    }
}
