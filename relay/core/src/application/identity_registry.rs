// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identity Registry
//!
//! Owns role-seat assignment. Every new connection for a role gets a freshly
//! generated identity installed through the store's atomic compare-and-assign;
//! when that displaces a different identity a [`RoleReassignedEvent`] goes out
//! on the bus before the call returns, so whichever node holds the old
//! session can tell it to leave.
//!
//! An unreachable store fails the assignment. There is no local fallback
//! identity, since one would silently break the single-live-identity rule
//! across the cluster.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Role binding lifecycle and identity validity checks

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::clock::Clock;
use crate::domain::error::RelayError;
use crate::domain::events::RoleReassignedEvent;
use crate::domain::repository::{AssignOutcome, BusChannel, MessageBus, SharedStateStore};
use crate::domain::role::{Identity, Role, RoleBinding};

/// Display name used when an identity holds no role seat.
pub const UNKNOWN_SENDER_NAME: &str = "Agent";

/// Answer to "is this identity still the live one for the role?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCheck {
    pub is_valid: bool,
    /// The identity currently bound to the role, if any.
    pub valid_identity: Option<Identity>,
}

pub struct IdentityRegistry {
    store: Arc<dyn SharedStateStore>,
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn Clock>,
}

impl IdentityRegistry {
    pub fn new(
        store: Arc<dyn SharedStateStore>,
        bus: Arc<dyn MessageBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, bus, clock }
    }

    /// Install a brand-new identity for `role` and return it.
    pub async fn assign_identity(&self, role: Role) -> Result<Identity, RelayError> {
        let identity = Identity::generate();
        let now = self.clock.now_millis();

        let outcome = self
            .store
            .compare_and_assign(
                &role.identity_key(),
                identity.as_str(),
                &role.assigned_at_key(),
                now,
            )
            .await
            .map_err(|e| {
                error!(role = %role, error = %e, "Identity assignment failed, rejecting connection");
                RelayError::from(e)
            })?;

        match outcome {
            AssignOutcome::Created => {
                info!(role = %role, identity = %identity, "Role bound to new identity");
            }
            AssignOutcome::Unchanged => {
                debug!(role = %role, identity = %identity, "Role binding unchanged");
            }
            AssignOutcome::Replaced(prior) => {
                let event = RoleReassignedEvent::new(role, Identity::from(prior), identity.clone(), now);
                info!(
                    role = %role,
                    old_identity = %event.old_id,
                    new_identity = %event.new_id,
                    "Role reassigned"
                );
                metrics::counter!("relay_role_reassignments_total", "role" => role.as_str())
                    .increment(1);
                self.emit_reassigned(&event).await;
            }
        }

        Ok(identity)
    }

    async fn emit_reassigned(&self, event: &RoleReassignedEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize role reassignment event");
                return;
            }
        };
        // The binding is already installed; a lost notice leaves the old
        // session connected but its identity invalid.
        if let Err(e) = self.bus.publish(BusChannel::Reassign, payload).await {
            warn!(
                role = %event.agent_type,
                old_identity = %event.old_id,
                error = %e,
                "Failed to publish role reassignment"
            );
            metrics::counter!("relay_delivery_failures_total", "kind" => "reassign").increment(1);
        }
    }

    /// Plain lookup; never creates state.
    pub async fn current_identity(&self, role: Role) -> Result<Option<Identity>, RelayError> {
        Ok(self
            .store
            .get(&role.identity_key())
            .await?
            .map(Identity::from))
    }

    pub async fn current_binding(&self, role: Role) -> Result<Option<RoleBinding>, RelayError> {
        let Some(identity) = self.current_identity(role).await? else {
            return Ok(None);
        };
        let assigned_at = self
            .store
            .get(&role.assigned_at_key())
            .await?
            .and_then(|raw| raw.parse::<i64>().ok());
        Ok(Some(RoleBinding {
            role,
            identity,
            assigned_at,
        }))
    }

    /// Which role, if any, `identity` currently holds.
    pub async fn resolve_role(&self, identity: &Identity) -> Result<Option<Role>, RelayError> {
        for role in Role::ALL {
            if self.current_identity(role).await?.as_ref() == Some(identity) {
                return Ok(Some(role));
            }
        }
        Ok(None)
    }

    pub async fn check_identity_validity(
        &self,
        role: Role,
        identity: &Identity,
    ) -> Result<IdentityCheck, RelayError> {
        let valid_identity = self.current_identity(role).await?;
        Ok(IdentityCheck {
            is_valid: valid_identity.as_ref() == Some(identity),
            valid_identity,
        })
    }

    /// Display name of whichever role `identity` holds, falling back to
    /// [`UNKNOWN_SENDER_NAME`] when it holds none or the store is unreachable.
    pub async fn display_name_for(&self, identity: &Identity) -> String {
        match self.resolve_role(identity).await {
            Ok(Some(role)) => role.display_name().to_string(),
            Ok(None) => UNKNOWN_SENDER_NAME.to_string(),
            Err(e) => {
                warn!(identity = %identity, error = %e, "Could not resolve sender role");
                UNKNOWN_SENDER_NAME.to_string()
            }
        }
    }
}
