//! # Response Broker
//!
//! Sits between a caller that expects one request/response cycle and a
//! workflow engine that may answer immediately, start a job silently, report
//! itself inactive, fail, or time out at the gateway.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Surface (axum)                    │
//! │  • POST /work, GET /work/status/:handle                    │
//! │  • inbound result channels, cache inspection, health       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Broker                            │
//! │  • Single-flight dispatch per subject                      │
//! │  • Classifier: sync / async / inactive / error / malformed │
//! │  • Matcher: staged reconciliation of tracking handles      │
//! └─────────────────────────────────────────────────────────────┘
//!           │                    │                      │
//!           ▼                    ▼                      ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │   Cache Tier     │ │ Request Registry │ │    Upstream      │
//! │ Redis + DashMap  │ │ memory | Redis   │ │ reqwest, timeout │
//! │ permanent        │ │ max entries, TTL │ │ no retry         │
//! │ downgrade        │ │                  │ │                  │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! Callers use the polling contract in [`poller`], either in-process against
//! a [`Broker`] or over HTTP through [`client::BrokerClient`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use response_broker::{server, Broker, BrokerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BrokerConfig::from_env()?;
//!     let broker = Arc::new(Broker::from_config(&config).await?);
//!
//!     let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
//!     server::serve(listener, broker, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`BrokerConfig`] for all options and their `BROKER_*` variables.
//!
//! ## Modules
//!
//! - [`broker`]: The [`Broker`] coordinating submission, status and delivery
//! - [`tier`]: Two-level result cache
//! - [`registry`]: In-flight work tracking
//! - [`storage`]: Store traits and the Redis / memory backends
//! - [`classifier`]: Upstream reply classification
//! - [`matcher`]: Tracking-handle reconciliation
//! - [`poller`]: Caller-side polling state machine
//! - [`server`]: axum router
//! - [`resilience`]: Retry with backoff

pub mod config;
pub mod error;
pub mod storage;
pub mod registry;
pub mod tier;
pub mod classifier;
pub mod upstream;
pub mod matcher;
pub mod broker;
pub mod poller;
pub mod client;
pub mod server;
pub mod resilience;
pub mod metrics;

pub use config::{BrokerConfig, ConfigError, RegistryBackend};
pub use error::BrokerError;
pub use broker::{Broker, DeliveryAck, HealthReport, SubmitOutcome, TrackingHandle, WorkRequest};
pub use classifier::{ClassifiedOutcome, Classifier};
pub use matcher::{MatchSource, StatusReport};
pub use poller::{PollConfig, PollState, Poller, StatusSource};
pub use registry::{InMemoryRegistry, RedisRegistry, RegistryEntry, RetentionPolicy};
pub use storage::traits::{CacheStore, RegistryStore, StorageError};
pub use tier::{CacheSource, CacheStats, CacheTier};
pub use upstream::{HttpUpstream, Upstream, UpstreamReply};
pub use resilience::retry::RetryConfig;
