// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Relay Node
//!
//! Wires every relay service for one node from its configuration and shared
//! backends, and owns the two background tasks a node runs: the bus
//! subscriber and the delayed task worker.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Service composition and background task lifecycle

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::backend_factory::{create_backends, Backends};
use crate::application::connection_gateway::ConnectionGateway;
use crate::application::history_log::HistoryLog;
use crate::application::identity_registry::IdentityRegistry;
use crate::application::liveness_monitor::LivenessMonitor;
use crate::application::message_relay::MessageRelay;
use crate::application::presence_tracker::PresenceTracker;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::error::RelayError;
use crate::domain::node_config::RelayConfigManifest;
use crate::infrastructure::session_registry::SessionRegistry;

pub struct RelayNode {
    node_id: String,
    gateway: Arc<ConnectionGateway>,
    relay: Arc<MessageRelay>,
    liveness: Arc<LivenessMonitor>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl RelayNode {
    /// Build a node on already-created backends.
    pub fn new(config: &RelayConfigManifest, backends: Backends, clock: Arc<dyn Clock>) -> Self {
        let spec = &config.spec;
        let sessions = SessionRegistry::default();

        let registry = Arc::new(IdentityRegistry::new(
            backends.store.clone(),
            backends.bus.clone(),
            clock.clone(),
        ));
        let history = Arc::new(HistoryLog::new(backends.history, spec.history.policy()));
        let presence = Arc::new(PresenceTracker::new(
            backends.store.clone(),
            backends.bus.clone(),
            backends.queue.clone(),
            registry.clone(),
            clock.clone(),
            spec.presence.clone(),
        ));
        let relay = Arc::new(MessageRelay::new(
            backends.bus,
            registry.clone(),
            history.clone(),
            sessions.clone(),
            clock.clone(),
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            backends.store,
            backends.queue,
            presence.clone(),
            clock,
            spec.liveness.clone(),
        ));
        let gateway = Arc::new(ConnectionGateway::new(
            registry,
            presence,
            relay.clone(),
            liveness.clone(),
            history,
            sessions,
        ));

        Self {
            node_id: spec.node.id.clone(),
            gateway,
            relay,
            liveness,
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Connect the configured backends and build the node on the system clock.
    pub async fn from_config(config: &RelayConfigManifest) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backends = create_backends(&config.spec.store.storage_backend(), clock.clone()).await?;
        Ok(Self::new(config, backends, clock))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn gateway(&self) -> Arc<ConnectionGateway> {
        self.gateway.clone()
    }

    /// Subscribe to the bus and start the delayed task worker.
    pub async fn start(&self) -> Result<(), RelayError> {
        let relay_handle = self.relay.clone().start().await?;
        let liveness_handle = self.liveness.clone().start();

        let mut handles = self.handles.lock();
        handles.push(relay_handle);
        handles.push(liveness_handle);
        info!(node_id = %self.node_id, "Relay node started");
        Ok(())
    }

    /// Signal both background tasks and wait for them to stop.
    pub async fn shutdown(&self) {
        self.relay.shutdown_token().cancel();
        self.liveness.shutdown_token().cancel();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!(node_id = %self.node_id, "Relay node stopped");
    }
}
