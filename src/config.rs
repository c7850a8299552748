// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the response broker.
//!
//! # Example
//!
//! ```
//! use response_broker::BrokerConfig;
//!
//! // Minimal config (uses defaults)
//! let config = BrokerConfig::default();
//! assert_eq!(config.poll_max_attempts, 120);
//! assert_eq!(config.min_text_body_len, 10);
//!
//! // Full config
//! let config = BrokerConfig {
//!     upstream_url: Some("https://engine.example.com/webhook/analysis".into()),
//!     redis_url: Some("redis://localhost:6379".into()),
//!     fallback_subjects: vec!["volvo a30g".into()],
//!     upstream_timeout_secs: 60,
//!     ..Default::default()
//! };
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::registry::RetentionPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Where the request registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Process-local map (in-flight state dies with the process)
    #[default]
    Memory,
    /// Shared Redis keys (visible to every broker instance)
    Redis,
}

impl FromStr for RegistryBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            _ => Err(()),
        }
    }
}

/// Configuration for the response broker.
///
/// All fields except `upstream_url` have defaults. The upstream URL is only
/// required when the broker builds its own HTTP upstream client
/// (see [`crate::Broker::from_config`]).
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Socket address the HTTP surface binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Workflow engine webhook that receives dispatched work
    #[serde(default)]
    pub upstream_url: Option<String>,

    /// Explicit bound on one upstream dispatch (seconds)
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Redis connection string for the shared cache primary
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace prefix for cached results in Redis
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,

    /// Namespace prefix for registry entries when the registry lives in Redis
    #[serde(default = "default_registry_prefix")]
    pub registry_prefix: String,

    #[serde(default)]
    pub registry_backend: RegistryBackend,

    /// Non-JSON bodies longer than this are treated as a textual result
    #[serde(default = "default_min_text_body_len")]
    pub min_text_body_len: usize,

    /// Polling contract
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Subjects consulted, in order, as the last reconciliation stage
    #[serde(default)]
    pub fallback_subjects: Vec<String>,

    /// Registry retention
    #[serde(default = "default_registry_max_entries")]
    pub registry_max_entries: Option<usize>,
    #[serde(default = "default_registry_ttl_secs")]
    pub registry_ttl_secs: Option<u64>,
    #[serde(default = "default_registry_sweep_secs")]
    pub registry_sweep_secs: u64,

    /// Local fallback cache bound (oldest entries evicted first)
    #[serde(default = "default_cache_max_local_entries")]
    pub cache_max_local_entries: Option<usize>,

    /// Payload field names
    #[serde(default = "default_subject_field")]
    pub subject_field: String,
    #[serde(default = "default_client_id_field")]
    pub client_id_field: String,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Subject used when the payload has no descriptive field
    #[serde(default = "default_subject")]
    pub default_subject: String,
}

fn default_bind_addr() -> String { "0.0.0.0:5000".to_string() }
fn default_upstream_timeout_secs() -> u64 { 120 }
fn default_redis_prefix() -> String { "residual_analysis:".to_string() }
fn default_registry_prefix() -> String { "broker_registry:".to_string() }
fn default_min_text_body_len() -> usize { 10 }
fn default_poll_interval_ms() -> u64 { 5_000 }
fn default_poll_max_attempts() -> u32 { 120 }
fn default_registry_max_entries() -> Option<usize> { Some(10_000) }
fn default_registry_ttl_secs() -> Option<u64> { Some(24 * 60 * 60) }
fn default_registry_sweep_secs() -> u64 { 300 }
fn default_cache_max_local_entries() -> Option<usize> { Some(10_000) }
fn default_subject_field() -> String { "itemDescription".to_string() }
fn default_client_id_field() -> String { "lesseeName".to_string() }
fn default_timestamp_field() -> String { "timestamp".to_string() }
fn default_subject() -> String { "unknown equipment".to_string() }

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            upstream_url: None,
            upstream_timeout_secs: default_upstream_timeout_secs(),
            redis_url: None,
            redis_prefix: default_redis_prefix(),
            registry_prefix: default_registry_prefix(),
            registry_backend: RegistryBackend::default(),
            min_text_body_len: default_min_text_body_len(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            fallback_subjects: Vec::new(),
            registry_max_entries: default_registry_max_entries(),
            registry_ttl_secs: default_registry_ttl_secs(),
            registry_sweep_secs: default_registry_sweep_secs(),
            cache_max_local_entries: default_cache_max_local_entries(),
            subject_field: default_subject_field(),
            client_id_field: default_client_id_field(),
            timestamp_field: default_timestamp_field(),
            default_subject: default_subject(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from `BROKER_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// `BROKER_UPSTREAM_URL` is required; every other variable falls back to
    /// the defaults above. Retention limits accept `0` or `none` to disable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let upstream_url = env::var("BROKER_UPSTREAM_URL")
            .map_err(|_| ConfigError::Missing("BROKER_UPSTREAM_URL"))?;

        let registry_backend = match env::var("BROKER_REGISTRY_BACKEND") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "BROKER_REGISTRY_BACKEND",
                value: raw,
            })?,
            Err(_) => defaults.registry_backend,
        };

        let fallback_subjects = env::var("BROKER_FALLBACK_SUBJECTS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            bind_addr: env::var("BROKER_BIND_ADDR").unwrap_or(defaults.bind_addr),
            upstream_url: Some(upstream_url),
            upstream_timeout_secs: env_parse("BROKER_UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout_secs)?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            redis_prefix: env::var("BROKER_REDIS_PREFIX").unwrap_or(defaults.redis_prefix),
            registry_prefix: env::var("BROKER_REGISTRY_PREFIX").unwrap_or(defaults.registry_prefix),
            registry_backend,
            min_text_body_len: env_parse("BROKER_MIN_TEXT_BODY_LEN", defaults.min_text_body_len)?,
            poll_interval_ms: env_parse("BROKER_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            poll_max_attempts: env_parse("BROKER_POLL_MAX_ATTEMPTS", defaults.poll_max_attempts)?,
            fallback_subjects,
            registry_max_entries: env_limit("BROKER_REGISTRY_MAX_ENTRIES", defaults.registry_max_entries)?,
            registry_ttl_secs: env_limit("BROKER_REGISTRY_TTL_SECS", defaults.registry_ttl_secs)?,
            registry_sweep_secs: env_parse("BROKER_REGISTRY_SWEEP_SECS", defaults.registry_sweep_secs)?,
            cache_max_local_entries: env_limit("BROKER_CACHE_MAX_LOCAL_ENTRIES", defaults.cache_max_local_entries)?,
            subject_field: env::var("BROKER_SUBJECT_FIELD").unwrap_or(defaults.subject_field),
            client_id_field: env::var("BROKER_CLIENT_ID_FIELD").unwrap_or(defaults.client_id_field),
            timestamp_field: env::var("BROKER_TIMESTAMP_FIELD").unwrap_or(defaults.timestamp_field),
            default_subject: env::var("BROKER_DEFAULT_SUBJECT").unwrap_or(defaults.default_subject),
        })
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn registry_retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_entries: self.registry_max_entries,
            ttl: self.registry_ttl_secs.map(Duration::from_secs),
        }
    }
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Like [`env_parse`], but `0` and `none` switch the limit off.
fn env_limit<T>(name: &'static str, default: Option<T>) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    match env::var(name) {
        Ok(raw) if raw.trim().eq_ignore_ascii_case("none") => Ok(None),
        Ok(raw) => {
            let value: T = raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw })?;
            Ok(if value == T::default() { None } else { Some(value) })
        }
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
