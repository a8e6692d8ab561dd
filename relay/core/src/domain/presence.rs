// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Presence flags for role seats and individual connections.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "ONLINE",
            PresenceStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(PresenceStatus::Online),
            "OFFLINE" => Ok(PresenceStatus::Offline),
            other => Err(format!("unknown presence status '{other}'")),
        }
    }
}

/// Presence of a role seat as written by the presence tracker.
///
/// The record expires passively so a crashed node's seat falls back to
/// "unknown" (reported as OFFLINE) without a clean disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub role: Role,
    pub status: PresenceStatus,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&PresenceStatus::Online).unwrap(),
            "\"ONLINE\""
        );
        assert_eq!("OFFLINE".parse::<PresenceStatus>(), Ok(PresenceStatus::Offline));
        assert!("online".parse::<PresenceStatus>().is_err());
    }
}
