// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use response_broker::{server, Broker, BrokerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,response_broker=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BrokerConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(bind = %config.bind_addr, "Configuration loaded");

    let broker = Arc::new(
        Broker::from_config(&config)
            .await
            .context("Failed to build broker")?,
    );

    let sweep_every = Duration::from_secs(config.registry_sweep_secs.max(1));
    let sweeper = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_every);
            // First tick fires immediately; nothing to purge yet
            interval.tick().await;
            loop {
                interval.tick().await;
                broker.purge_expired().await;
            }
        })
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Response broker listening");

    server::serve(listener, broker, shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    tracing::info!("Response broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
