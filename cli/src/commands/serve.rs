// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `agent-relay serve`
//!
//! Loads the configuration, connects the store backends, starts the bus
//! subscriber and delayed task worker, and serves HTTP/WebSocket until
//! Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use agent_relay_core::application::RelayNode;
use agent_relay_core::domain::node_config::RelayConfigManifest;
use agent_relay_core::presentation::{router, AppState};

pub async fn run(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = RelayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    if let Some(host) = host {
        config.spec.network.bind_address = host;
    }
    if let Some(port) = port {
        config.spec.network.port = port;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        node_id = %config.spec.node.id,
        backend = ?config.spec.store.backend,
        "Configuration loaded"
    );

    if let Some(metrics) = config.metrics().filter(|m| m.enabled) {
        install_metrics_exporter(metrics.port)?;
    }

    let node = RelayNode::from_config(&config)
        .await
        .context("Failed to initialize store backends")?;
    node.start().await.context("Failed to start relay node")?;

    let state = Arc::new(AppState {
        gateway: node.gateway(),
        node_id: node.node_id().to_string(),
    });
    let app = router(state);

    let addr = format!(
        "{}:{}",
        config.spec.network.bind_address, config.spec.network.port
    );
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Relay node listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Relay node shutting down");
    node.shutdown().await;

    served
}

fn install_metrics_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!(
        "relay_messages_published_total",
        "Messages published onto the cluster bus"
    );
    metrics::describe_counter!(
        "relay_deliveries_total",
        "Frames delivered to sessions attached to this node"
    );
    metrics::describe_counter!(
        "relay_delivery_failures_total",
        "Messages dropped after a failed publish"
    );
    metrics::describe_counter!(
        "relay_role_reassignments_total",
        "Role seats taken over by a new identity"
    );
    metrics::describe_counter!(
        "relay_heartbeat_timeouts_total",
        "Connections flipped offline by a deferred recheck"
    );
    metrics::describe_gauge!("relay_local_sessions", "Sessions attached to this node");

    info!("Prometheus metrics exporter listening on {}", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
