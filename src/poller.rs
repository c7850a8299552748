// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-side polling contract.
//!
//! ```text
//! Idle → Submitting → Waiting ─┬─▶ Completed
//!                       ▲  │   ├─▶ TimedOut   (attempt ceiling reached)
//!                       └──┘   └─▶ Failed     (status query failed)
//!                     pending
//! ```
//!
//! The first status query goes out immediately; later ones are spaced by
//! [`PollConfig::interval`]. With the defaults (5 s, 120 attempts) a session
//! ends after at most 120 queries and 595 s of sleeping. A failed query ends
//! the session at once; it is not retried.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::broker::{Broker, TrackingHandle};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::matcher::StatusReport;

/// Anything that can answer a status query for a handle.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn query_status(&self, handle: &str) -> Result<StatusReport, BrokerError>;
}

#[async_trait]
impl StatusSource for Broker {
    async fn query_status(&self, handle: &str) -> Result<StatusReport, BrokerError> {
        Ok(self.status(handle).await)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
        }
    }
}

impl PollConfig {
    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.poll_max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Idle,
    Submitting,
    Waiting { handle: TrackingHandle, attempts: u32 },
    Completed { result: Value, attempts: u32 },
    TimedOut { handle: TrackingHandle, attempts: u32 },
    Failed { error: BrokerError },
}

impl PollState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::TimedOut { .. } | Self::Failed { .. })
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Waiting { .. } => "waiting",
            Self::Completed { .. } => "completed",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }

    /// Collapse a terminal state into the result or the error that ended it.
    pub fn into_result(self) -> Result<Value, BrokerError> {
        match self {
            Self::Completed { result, .. } => Ok(result),
            Self::TimedOut { attempts, .. } => Err(BrokerError::PollingTimeout { attempts }),
            Self::Failed { error } => Err(error),
            other => Err(BrokerError::Polling(format!("session not finished ({})", other.label()))),
        }
    }
}

pub struct Poller<'a, S: StatusSource + ?Sized> {
    source: &'a S,
    config: PollConfig,
}

impl<'a, S: StatusSource + ?Sized> Poller<'a, S> {
    pub fn new(source: &'a S, config: PollConfig) -> Self {
        Self { source, config }
    }

    /// Poll `handle` until a terminal state.
    pub async fn wait(&self, handle: TrackingHandle) -> PollState {
        info!(handle = %handle, "Waiting for deferred result");
        let mut state = PollState::Waiting { handle, attempts: 0 };
        while !state.is_terminal() {
            state = self.step(state).await;
        }

        let attempts = match &state {
            PollState::Completed { attempts, .. } | PollState::TimedOut { attempts, .. } => *attempts,
            _ => 0,
        };
        info!(state = state.label(), attempts, "Polling session ended");
        crate::metrics::record_poll_terminal(state.label(), attempts);
        state
    }

    /// Advance one transition. Only `Waiting` moves; every other state is
    /// returned unchanged.
    pub async fn step(&self, state: PollState) -> PollState {
        let (handle, attempts) = match state {
            PollState::Waiting { handle, attempts } => (handle, attempts),
            other => return other,
        };

        if attempts >= self.config.max_attempts {
            return PollState::TimedOut { handle, attempts };
        }
        if attempts > 0 {
            tokio::time::sleep(self.config.interval).await;
        }
        let attempts = attempts + 1;

        match self.source.query_status(handle.as_str()).await {
            Ok(StatusReport::Completed { result, .. }) => {
                crate::metrics::record_poll_attempt("completed");
                PollState::Completed { result, attempts }
            }
            Ok(StatusReport::Pending { .. }) => {
                debug!(handle = %handle, attempts, "Still pending");
                crate::metrics::record_poll_attempt("pending");
                PollState::Waiting { handle, attempts }
            }
            Err(e) => {
                warn!(handle = %handle, attempts, error = %e, "Status query failed");
                crate::metrics::record_poll_attempt("error");
                let error = match e {
                    BrokerError::Polling(_) => e,
                    other => BrokerError::Polling(other.to_string()),
                };
                PollState::Failed { error }
            }
        }
    }
}
