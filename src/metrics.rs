// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the response broker.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The embedding
//! process chooses the exporter (Prometheus, OTEL, etc.); without one
//! installed every call here is a no-op.
//!
//! # Metric Naming Convention
//! - `broker_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `outcome`: sync_success, async_started, not_active, http_error, malformed_body, network_error
//! - `tier`: redis, memory
//! - `stage`: reconciliation stage that answered a status query
//! - `channel`: inbound delivery channel

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record one upstream dispatch and how long the engine took to answer
pub fn record_dispatch(outcome: &str, duration: Duration) {
    counter!(
        "broker_dispatches_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "broker_dispatch_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a cache lookup result ("hit" / "miss" / "error")
pub fn record_cache_lookup(tier: &str, result: &str) {
    counter!(
        "broker_cache_lookups_total",
        "tier" => tier.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a cache write
pub fn record_cache_write(tier: &str, status: &str) {
    counter!(
        "broker_cache_writes_total",
        "tier" => tier.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// The shared primary was marked unavailable for the rest of the process
pub fn record_primary_downgrade(operation: &str) {
    counter!(
        "broker_cache_primary_downgrades_total",
        "operation" => operation.to_string()
    )
    .increment(1);
    gauge!("broker_cache_primary_available").set(0.0);
}

pub fn set_primary_available(available: bool) {
    gauge!("broker_cache_primary_available").set(if available { 1.0 } else { 0.0 });
}

/// A submission was answered from cache without touching the upstream
pub fn record_cache_served_submission() {
    counter!("broker_submissions_cached_total").increment(1);
}

/// A submission joined an in-flight dispatch for the same subject
pub fn record_single_flight_join() {
    counter!("broker_single_flight_joins_total").increment(1);
}

/// Which reconciliation stage answered a status query ("none" when pending)
pub fn record_reconciliation(stage: &str) {
    counter!(
        "broker_reconciliations_total",
        "stage" => stage.to_string()
    )
    .increment(1);
}

/// Record an inbound result delivery
pub fn record_delivery(channel: &str, fanned_out: usize) {
    counter!(
        "broker_deliveries_total",
        "channel" => channel.to_string()
    )
    .increment(1);
    if fanned_out > 0 {
        counter!("broker_delivery_token_matches_total").increment(fanned_out as u64);
    }
}

/// Record registry/cache entries dropped by retention
pub fn record_eviction(store: &str, count: usize) {
    counter!(
        "broker_evictions_total",
        "store" => store.to_string()
    )
    .increment(count as u64);
}

pub fn set_registry_entries(count: usize) {
    gauge!("broker_registry_entries").set(count as f64);
}

/// Record one caller-side poll attempt ("pending" / "completed" / "error")
pub fn record_poll_attempt(result: &str) {
    counter!(
        "broker_poll_attempts_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record how a polling session ended
pub fn record_poll_terminal(state: &str, attempts: u32) {
    counter!(
        "broker_poll_sessions_total",
        "state" => state.to_string()
    )
    .increment(1);
    histogram!("broker_poll_session_attempts").record(attempts as f64);
}
