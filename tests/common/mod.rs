//! Shared fixtures for the integration test binaries.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use response_broker::{
    Broker, BrokerConfig, BrokerError, CacheTier, InMemoryRegistry, RegistryStore, Upstream, UpstreamReply,
};

pub const ENDPOINT: &str = "http://engine.test/webhook/residual";

/// Upstream that plays back queued replies, then repeats a fallback reply.
pub struct ScriptedUpstream {
    queued: Mutex<VecDeque<Result<UpstreamReply, BrokerError>>>,
    fallback: Result<UpstreamReply, BrokerError>,
    delay: Duration,
    calls: AtomicUsize,
    payloads: Mutex<Vec<Value>>,
}

impl ScriptedUpstream {
    pub fn always(status: u16, body: &str) -> Arc<Self> {
        Self::build(Ok(UpstreamReply::new(status, body)), Duration::ZERO)
    }

    pub fn slow(status: u16, body: &str, delay: Duration) -> Arc<Self> {
        Self::build(Ok(UpstreamReply::new(status, body)), delay)
    }

    pub fn unreachable() -> Arc<Self> {
        Self::build(Err(BrokerError::Network("connection refused".into())), Duration::ZERO)
    }

    fn build(fallback: Result<UpstreamReply, BrokerError>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            delay,
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        })
    }

    /// Queue a one-off reply ahead of the fallback.
    pub fn then(self: &Arc<Self>, status: u16, body: &str) -> Arc<Self> {
        self.queued
            .lock()
            .unwrap()
            .push_back(Ok(UpstreamReply::new(status, body)));
        self.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn dispatch(&self, payload: &Value) -> Result<UpstreamReply, BrokerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.queued.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }
}

pub fn test_config() -> BrokerConfig {
    BrokerConfig {
        upstream_url: Some(ENDPOINT.to_string()),
        ..Default::default()
    }
}

pub struct Harness {
    pub broker: Arc<Broker>,
    pub registry: Arc<InMemoryRegistry>,
    pub upstream: Arc<ScriptedUpstream>,
}

impl Harness {
    pub fn new(upstream: Arc<ScriptedUpstream>) -> Self {
        Self::with(upstream, CacheTier::local_only(None), test_config())
    }

    pub fn with(upstream: Arc<ScriptedUpstream>, cache: CacheTier, config: BrokerConfig) -> Self {
        let registry = Arc::new(InMemoryRegistry::new(config.registry_retention()));
        let broker = Arc::new(Broker::new(
            &config,
            Arc::new(cache),
            registry.clone() as Arc<dyn RegistryStore>,
            upstream.clone(),
        ));
        Self {
            broker,
            registry,
            upstream,
        }
    }

    pub fn router(&self) -> Router {
        response_broker::server::router(self.broker.clone())
    }
}

/// Drive one request through the router and decode the JSON reply.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}
