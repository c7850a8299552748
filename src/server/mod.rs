// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP surface.
//!
//! | Method | Path                      | Handler                          |
//! |--------|---------------------------|----------------------------------|
//! | POST   | `/work`                   | submit                           |
//! | GET    | `/work/status/:handle`    | reconcile a handle               |
//! | POST   | `/work/result/:handle`    | result push (with token fan-out) |
//! | GET    | `/work/callback/:handle`  | query-string callback            |
//! | POST   | `/work/callback/:handle`  | legacy push, registry only       |
//! | POST   | `/work/complete/:handle`  | manual completion                |
//! | GET    | `/cache/stats`            | cache key listing                |
//! | GET    | `/cache/:key`             | direct cache read                |
//! | GET    | `/health`                 | liveness and tier status         |

mod response;
mod routes;

pub use response::accepted_payload;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::broker::Broker;

pub fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/work", post(routes::submit))
        .route("/work/status/:handle", get(routes::status))
        .route("/work/result/:handle", post(routes::result))
        .route("/work/callback/:handle", get(routes::callback).post(routes::callback_push))
        .route("/work/complete/:handle", post(routes::complete))
        .route("/cache/stats", get(routes::cache_stats))
        .route("/cache/:key", get(routes::cache_lookup))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(broker)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, broker: Arc<Broker>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(broker))
        .with_graceful_shutdown(shutdown)
        .await
}
