// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis storage backend: the shared primary of the cache tier.
//!
//! Values are stored as plain JSON strings (`SET key <json>`) under a
//! namespace prefix, so several applications can share one Redis:
//!
//! ```text
//! residual_analysis:volvo a30g           → {"residualAnalysis": "...", ...}
//! residual_analysis:request_1700000000000 → {...}
//! ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};
use serde_json::Value;

use super::traits::{CacheStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

/// Keys fetched per SCAN round trip
const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    /// Key prefix for namespacing (e.g., "residual_analysis:" → "residual_analysis:volvo a30g")
    prefix: String,
}

impl RedisStore {
    /// Connect with an optional key prefix.
    ///
    /// The initial connection uses the startup retry preset: a handful of
    /// attempts, then the error is returned so the caller can fall back to
    /// local-only operation.
    ///
    /// ```rust,no_run
    /// # use response_broker::storage::redis::RedisStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = RedisStore::with_prefix("redis://localhost", Some("residual_analysis:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    #[inline]
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key)
        }
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Store a value with an expiry (`SET key value EX ttl`).
    pub async fn put_with_ttl(&self, key: &str, value: &Value, ttl_secs: u64) -> Result<(), StorageError> {
        let data = serde_json::to_string(value)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry("redis_set_ex", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let data = data.clone();
            async move {
                let _: () = conn.set_ex(&key, &data, ttl_secs).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        let raw: Option<String> = retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let data: Option<String> = conn.get(&key).await?;
                Ok(data)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let data = serde_json::to_string(value)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            let data = data.clone();
            async move {
                let _: () = conn.set(&key, &data).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))
    }

    /// Cursor-based SCAN over `{prefix}*`; never blocks Redis the way KEYS would.
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(format!("SCAN failed: {}", e)))?;

            keys.extend(batch.iter().map(|k| self.strip_prefix(k).to_string()));

            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
