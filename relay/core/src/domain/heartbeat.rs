// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Heartbeats and the tasks carried by the delayed-delivery queue.

use serde::{Deserialize, Serialize};

use super::role::Identity;

pub fn heartbeat_key(connection_id: &Identity) -> String {
    format!("client:heartbeat:{connection_id}")
}

pub fn client_status_key(connection_id: &Identity) -> String {
    format!("client:status:{connection_id}")
}

/// Last heartbeat seen for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRecord {
    pub connection_id: Identity,
    pub last_seen_at: i64,
    pub expires_at: i64,
}

/// Payload of a deferred liveness recheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecheckRequest {
    pub connection_id: Identity,
    /// Timestamp of the heartbeat that scheduled this recheck.
    pub observed_at: i64,
    /// Delivery attempt, starting at 0.
    #[serde(default)]
    pub attempt: u32,
}

/// Work item held by the delayed-delivery queue until it becomes due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum DelayedTask {
    Recheck(RecheckRequest),
    /// Deferred presence flip issued right after a connection is established.
    MarkOnline {
        identity: Identity,
        #[serde(default)]
        attempt: u32,
    },
}

impl DelayedTask {
    pub fn attempt(&self) -> u32 {
        match self {
            DelayedTask::Recheck(req) => req.attempt,
            DelayedTask::MarkOnline { attempt, .. } => *attempt,
        }
    }

    /// The same task with its attempt counter bumped, for a single redelivery.
    pub fn next_attempt(&self) -> Self {
        match self {
            DelayedTask::Recheck(req) => DelayedTask::Recheck(RecheckRequest {
                attempt: req.attempt + 1,
                ..req.clone()
            }),
            DelayedTask::MarkOnline { identity, attempt } => DelayedTask::MarkOnline {
                identity: identity.clone(),
                attempt: attempt + 1,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DelayedTask::Recheck(_) => "recheck",
            DelayedTask::MarkOnline { .. } => "mark_online",
        }
    }
}

/// Result of a deferred recheck. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecheckOutcome {
    /// No heartbeat within the interval; the connection was marked offline.
    TimedOut,
    /// The heartbeat that scheduled the recheck is still within the interval.
    Fresh,
    /// A newer heartbeat arrived after this recheck was scheduled.
    Superseded,
}
