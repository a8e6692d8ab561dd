// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use super::presence::PresenceStatus;
use super::role::{Identity, Role};

/// A role seat flipped between ONLINE and OFFLINE.
///
/// Fanned out to every session on every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChangedEvent {
    pub agent_type: Role,
    pub agent_name: String,
    pub status: PresenceStatus,
    pub timestamp: i64,
}

impl PresenceChangedEvent {
    pub fn new(role: Role, status: PresenceStatus, timestamp: i64) -> Self {
        Self {
            agent_type: role,
            agent_name: role.display_name().to_string(),
            status,
            timestamp,
        }
    }
}

/// A role seat was taken over by a new identity.
///
/// Emitted at most once per reassignment; the node holding `old_id` tells that
/// session to go away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleReassignedEvent {
    pub agent_type: Role,
    pub old_id: Identity,
    pub new_id: Identity,
    pub agent_name: String,
    pub timestamp: i64,
}

impl RoleReassignedEvent {
    pub fn new(role: Role, old_id: Identity, new_id: Identity, timestamp: i64) -> Self {
        Self {
            agent_type: role,
            old_id,
            new_id,
            agent_name: role.display_name().to_string(),
            timestamp,
        }
    }

    /// Text shown to the superseded connection.
    pub fn notice_text(&self) -> String {
        format!(
            "[System notice] Your agent ID has changed, please refresh the page. Old ID: {}, new ID: {}",
            self.old_id, self.new_id
        )
    }
}
