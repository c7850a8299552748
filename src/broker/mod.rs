// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Broker coordinator.
//!
//! The [`Broker`] ties the components together:
//! - [`CacheTier`] for completed results, keyed by normalized subject
//! - a [`RegistryStore`] for in-flight work, keyed by tracking handle
//! - an [`Upstream`] that receives dispatched work
//! - the [`Classifier`] and [`Matcher`]
//!
//! # Request flow
//!
//! ```text
//! submit ─▶ cache hit? ──yes──▶ Cached
//!              │ no
//!              ▼
//!         claim subject ──taken──▶ wait for leader's outcome
//!              │ claimed
//!              ▼
//!         dispatch ─▶ classify ─┬─▶ SyncSuccess  ─▶ cache[subject]          ─▶ Completed
//!                               ├─▶ AsyncStarted ─▶ registry[handle]=processing ─▶ Accepted
//!                               └─▶ errors                                   ─▶ Rejected
//!
//! deliver_result(id) ─▶ registry[id] + registry[k ⊇ id] ─▶ cache[subject], cache[request_{id}]
//! status(handle)     ─▶ Matcher
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use response_broker::{Broker, BrokerConfig, SubmitOutcome};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BrokerConfig {
//!     upstream_url: Some("https://engine.example/webhook/residual".into()),
//!     ..Default::default()
//! };
//! let broker = Broker::from_config(&config).await?;
//!
//! match broker.submit(json!({"lesseeName": "acme", "itemDescription": "Volvo A30G"})).await {
//!     SubmitOutcome::Accepted(handle) => println!("poll {}", handle),
//!     other => println!("{:?}", other),
//! }
//! # Ok(())
//! # }
//! ```

mod types;
mod dispatch;
mod delivery;

pub use types::{
    DeliveryAck, HealthReport, PayloadFields, SubmitOutcome, TrackingHandle, WorkRequest, ANONYMOUS_CLIENT,
};

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::config::{BrokerConfig, ConfigError, RegistryBackend};
use crate::matcher::{Matcher, StatusReport};
use crate::registry::{InMemoryRegistry, RedisRegistry};
use crate::storage::redis::RedisStore;
use crate::storage::traits::RegistryStore;
use crate::tier::{CacheStats, CacheTier};
use crate::upstream::{HttpUpstream, Upstream};

/// Asynchronous response broker.
///
/// `Send + Sync`; share it behind an `Arc`. All state lives in concurrent
/// maps or behind the store traits.
pub struct Broker {
    pub(super) cache: Arc<CacheTier>,
    pub(super) registry: Arc<dyn RegistryStore>,
    pub(super) upstream: Arc<dyn Upstream>,
    pub(super) classifier: Classifier,
    pub(super) matcher: Matcher,
    pub(super) fields: PayloadFields,

    /// Subjects with a dispatch in flight. Followers clone the receiver and
    /// wait for the leader to publish its outcome.
    pub(super) in_flight: DashMap<String, watch::Receiver<Option<SubmitOutcome>>>,
}

impl Broker {
    /// Assemble a broker from already-built parts.
    pub fn new(
        config: &BrokerConfig,
        cache: Arc<CacheTier>,
        registry: Arc<dyn RegistryStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let matcher = Matcher::new(registry.clone(), cache.clone(), config.fallback_subjects.clone());
        Self {
            cache,
            registry,
            upstream,
            classifier: Classifier::new(config.min_text_body_len),
            matcher,
            fields: PayloadFields::from_config(config),
            in_flight: DashMap::new(),
        }
    }

    /// Connect the cache tier and registry described by `config` and build
    /// the HTTP upstream.
    ///
    /// Unreachable Redis is not an error: the cache tier and a Redis registry
    /// both degrade to process-local storage.
    pub async fn from_config(config: &BrokerConfig) -> Result<Self, ConfigError> {
        let url = config
            .upstream_url
            .as_deref()
            .ok_or(ConfigError::Missing("BROKER_UPSTREAM_URL"))?;
        let upstream = HttpUpstream::new(url, config.upstream_timeout()).map_err(|_| ConfigError::Invalid {
            name: "BROKER_UPSTREAM_URL",
            value: url.to_string(),
        })?;

        let cache = CacheTier::connect(
            config.redis_url.as_deref(),
            &config.redis_prefix,
            config.cache_max_local_entries,
        )
        .await;
        let registry = Self::connect_registry(config).await?;

        info!(
            upstream = %url,
            cache = %cache.source(),
            registry = ?config.registry_backend,
            "Broker ready"
        );
        Ok(Self::new(config, Arc::new(cache), registry, Arc::new(upstream)))
    }

    async fn connect_registry(config: &BrokerConfig) -> Result<Arc<dyn RegistryStore>, ConfigError> {
        let retention = config.registry_retention();
        match config.registry_backend {
            RegistryBackend::Memory => Ok(Arc::new(InMemoryRegistry::new(retention))),
            RegistryBackend::Redis => {
                let url = config.redis_url.as_deref().ok_or(ConfigError::Missing("REDIS_URL"))?;
                match RedisStore::with_prefix(url, Some(&config.registry_prefix)).await {
                    Ok(store) => Ok(Arc::new(RedisRegistry::new(store, retention))),
                    Err(e) => {
                        warn!(error = %e, "Redis registry unavailable, tracking in-flight work in memory");
                        Ok(Arc::new(InMemoryRegistry::new(retention)))
                    }
                }
            }
        }
    }

    /// Reconcile a tracking handle against registry and cache.
    pub async fn status(&self, handle: &str) -> StatusReport {
        self.matcher.reconcile(handle).await
    }

    /// Direct cache read (key is normalized).
    pub async fn cache_lookup(&self, key: &str) -> Option<Value> {
        self.cache.get(key).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop registry entries past their retention.
    pub async fn purge_expired(&self) -> usize {
        match self.registry.purge_expired().await {
            Ok(purged) => {
                if purged > 0 {
                    info!(purged, "Purged expired registry entries");
                } else {
                    debug!("Registry sweep found nothing to purge");
                }
                self.registry_len().await;
                purged
            }
            Err(e) => {
                warn!(error = %e, "Registry sweep failed");
                0
            }
        }
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            cache: self.cache.source(),
            registry_entries: self.registry_len().await,
        }
    }

    async fn registry_len(&self) -> usize {
        match self.registry.len().await {
            Ok(len) => {
                crate::metrics::set_registry_entries(len);
                len
            }
            Err(e) => {
                warn!(error = %e, "Registry size unavailable");
                0
            }
        }
    }

    /// Subjects currently being dispatched
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
