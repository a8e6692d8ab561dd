// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Presence Tracker
//!
//! Flips the presence flag of the role an identity currently holds and
//! announces the flip to every session on every node. Identities that hold no
//! role (stale or unknown) are ignored.
//!
//! The ONLINE flip after a connection is deferred through the delayed queue
//! so the registry's write is visible to the read that resolves the role.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::identity_registry::IdentityRegistry;
use crate::domain::clock::Clock;
use crate::domain::error::RelayError;
use crate::domain::events::PresenceChangedEvent;
use crate::domain::heartbeat::DelayedTask;
use crate::domain::node_config::PresenceConfig;
use crate::domain::presence::{PresenceRecord, PresenceStatus};
use crate::domain::repository::{BusChannel, DelayedQueue, MessageBus, SharedStateStore};
use crate::domain::role::{Identity, Role};

pub struct PresenceTracker {
    store: Arc<dyn SharedStateStore>,
    bus: Arc<dyn MessageBus>,
    queue: Arc<dyn DelayedQueue>,
    registry: Arc<IdentityRegistry>,
    clock: Arc<dyn Clock>,
    config: PresenceConfig,
}

impl PresenceTracker {
    pub fn new(
        store: Arc<dyn SharedStateStore>,
        bus: Arc<dyn MessageBus>,
        queue: Arc<dyn DelayedQueue>,
        registry: Arc<IdentityRegistry>,
        clock: Arc<dyn Clock>,
        config: PresenceConfig,
    ) -> Self {
        Self {
            store,
            bus,
            queue,
            registry,
            clock,
            config,
        }
    }

    pub async fn mark_online(&self, identity: &Identity) -> Result<Option<PresenceRecord>, RelayError> {
        self.set_presence(identity, PresenceStatus::Online).await
    }

    pub async fn mark_offline(&self, identity: &Identity) -> Result<Option<PresenceRecord>, RelayError> {
        self.set_presence(identity, PresenceStatus::Offline).await
    }

    /// Queue the ONLINE flip for a freshly connected identity.
    pub async fn schedule_online(&self, identity: &Identity) -> Result<(), RelayError> {
        self.queue
            .schedule(
                DelayedTask::MarkOnline {
                    identity: identity.clone(),
                    attempt: 0,
                },
                self.config.online_delay(),
            )
            .await?;
        Ok(())
    }

    /// Absent when no flag has been written or it has expired.
    pub async fn get_status(&self, role: Role) -> Result<Option<PresenceStatus>, RelayError> {
        let Some(raw) = self.store.get(&role.status_key()).await? else {
            return Ok(None);
        };
        match raw.parse::<PresenceStatus>() {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                warn!(role = %role, error = %e, "Ignoring unreadable presence flag");
                Ok(None)
            }
        }
    }

    async fn set_presence(
        &self,
        identity: &Identity,
        status: PresenceStatus,
    ) -> Result<Option<PresenceRecord>, RelayError> {
        let Some(role) = self.registry.resolve_role(identity).await? else {
            debug!(identity = %identity, status = %status, "Identity holds no role, presence unchanged");
            return Ok(None);
        };

        let now = self.clock.now_millis();
        let ttl = self.config.ttl();
        self.store
            .set_with_expiry(&role.status_key(), status.as_str(), ttl)
            .await?;
        info!(role = %role, identity = %identity, status = %status, "Presence updated");

        let event = PresenceChangedEvent::new(role, status, now);
        match serde_json::to_string(&event) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(BusChannel::Presence, payload).await {
                    warn!(role = %role, error = %e, "Failed to publish presence change");
                    metrics::counter!("relay_delivery_failures_total", "kind" => "presence")
                        .increment(1);
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize presence change"),
        }

        Ok(Some(PresenceRecord {
            role,
            status,
            expires_at: now + ttl.as_millis() as i64,
        }))
    }
}
