// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Submission path: cache check, single-flight claim, dispatch, classify.

use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Broker, SubmitOutcome, WorkRequest};
use crate::classifier::{ClassifiedOutcome, HttpErrorKind};
use crate::error::BrokerError;
use crate::registry::RegistryEntry;

type OutcomeSlot = watch::Receiver<Option<SubmitOutcome>>;

enum Claim<'a> {
    Leader(Flight<'a>),
    Follower(OutcomeSlot),
}

/// A claimed dispatch slot. Dropping it frees the subject, whether or not an
/// outcome was published.
struct Flight<'a> {
    in_flight: &'a DashMap<String, OutcomeSlot>,
    subject: String,
    tx: watch::Sender<Option<SubmitOutcome>>,
}

impl Flight<'_> {
    fn publish(&self, outcome: &SubmitOutcome) {
        self.tx.send_replace(Some(outcome.clone()));
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.subject);
    }
}

/// Wait for the leader. `None` means it went away without an outcome.
async fn await_leader(mut rx: OutcomeSlot) -> Option<SubmitOutcome> {
    loop {
        let current = (*rx.borrow_and_update()).clone();
        if current.is_some() {
            return current;
        }
        if rx.changed().await.is_err() {
            return (*rx.borrow()).clone();
        }
    }
}

impl Broker {
    /// Submit one unit of work.
    ///
    /// At most one upstream dispatch runs per subject key: concurrent
    /// submissions for a subject already in flight share the leader's outcome,
    /// including its tracking handle. Never fails; upstream trouble is
    /// reported as [`SubmitOutcome::Rejected`].
    #[tracing::instrument(skip(self, payload), fields(subject, handle))]
    pub async fn submit(&self, payload: Value) -> SubmitOutcome {
        let request = WorkRequest::from_payload(payload, &self.fields);
        let span = tracing::Span::current();
        span.record("subject", request.subject_key.as_str());
        span.record("handle", request.handle.as_str());

        loop {
            if let Some(hit) = self.cache.get(&request.subject_key).await {
                info!("Serving cached result, upstream not contacted");
                crate::metrics::record_cache_served_submission();
                return SubmitOutcome::Cached(hit);
            }

            match self.claim(&request.subject_key) {
                Claim::Leader(flight) => return self.lead(&request, flight).await,
                Claim::Follower(rx) => {
                    debug!("Dispatch already in flight for subject, waiting");
                    if let Some(outcome) = await_leader(rx).await {
                        crate::metrics::record_single_flight_join();
                        return outcome;
                    }
                    debug!("In-flight dispatch abandoned, retrying claim");
                }
            }
        }
    }

    fn claim(&self, subject: &str) -> Claim<'_> {
        match self.in_flight.entry(subject.to_string()) {
            Entry::Occupied(slot) => Claim::Follower(slot.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx);
                Claim::Leader(Flight {
                    in_flight: &self.in_flight,
                    subject: subject.to_string(),
                    tx,
                })
            }
        }
    }

    async fn lead(&self, request: &WorkRequest, flight: Flight<'_>) -> SubmitOutcome {
        // A previous leader may have filled the cache between lookup and claim
        let outcome = match self.cache.get(&request.subject_key).await {
            Some(hit) => {
                crate::metrics::record_cache_served_submission();
                SubmitOutcome::Cached(hit)
            }
            None => self.dispatch(request).await,
        };
        flight.publish(&outcome);
        outcome
    }

    async fn dispatch(&self, request: &WorkRequest) -> SubmitOutcome {
        let start = Instant::now();

        let reply = match self.upstream.dispatch(&request.payload).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(endpoint = %self.upstream.endpoint(), error = %e, "Upstream dispatch failed");
                crate::metrics::record_dispatch("network_error", start.elapsed());
                return SubmitOutcome::Rejected(e);
            }
        };

        let classified = self.classifier.classify(reply.status, &reply.body, &request.handle);
        crate::metrics::record_dispatch(classified.label(), start.elapsed());
        info!(
            status = reply.status,
            body_len = reply.body.len(),
            outcome = classified.label(),
            "Upstream reply classified"
        );

        match classified {
            ClassifiedOutcome::SyncSuccess(result) => {
                self.cache.set(&request.subject_key, &result).await;
                SubmitOutcome::Completed(result)
            }
            ClassifiedOutcome::AsyncStarted(handle) => {
                let entry = RegistryEntry::processing(request.subject_key.clone());
                if let Err(e) = self.registry.put(handle.as_str(), entry).await {
                    // Deliveries recreate the entry, so polling still resolves
                    warn!(handle = %handle, error = %e, "Failed to register in-flight work");
                }
                SubmitOutcome::Accepted(handle)
            }
            ClassifiedOutcome::NotActive => SubmitOutcome::Rejected(BrokerError::NotActive {
                endpoint: self.upstream.endpoint().to_string(),
            }),
            ClassifiedOutcome::HttpError { body, kind: HttpErrorKind::WorkflowNotStarted, .. } => {
                SubmitOutcome::Rejected(BrokerError::WorkflowNotStarted { body })
            }
            ClassifiedOutcome::HttpError { status, body, kind: HttpErrorKind::Upstream } => {
                SubmitOutcome::Rejected(BrokerError::Http {
                    status,
                    body,
                    endpoint: self.upstream.endpoint().to_string(),
                })
            }
            ClassifiedOutcome::MalformedBody(raw) => SubmitOutcome::Unstructured(raw),
        }
    }
}
