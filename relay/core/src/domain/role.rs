// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Role seats and connection identities.
//!
//! A [`Role`] is one of the fixed seats a connection can claim. Each seat has
//! exactly one live [`Identity`] at a time, recorded as a [`RoleBinding`] in the
//! shared store under keys derived from the role (never hardcoded per seat).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    A,
    B,
}

impl Role {
    /// Every seat, in resolution order.
    pub const ALL: [Role; 2] = [Role::A, Role::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::A => "a",
            Role::B => "b",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::A => "Agent A",
            Role::B => "Agent B",
        }
    }

    pub fn identity_key(&self) -> String {
        format!("agent:{}:id", self.as_str())
    }

    pub fn assigned_at_key(&self) -> String {
        format!("agent:{}:id:assigned_at", self.as_str())
    }

    pub fn status_key(&self) -> String {
        format!("agent:{}:status", self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}', expected 'a' or 'b'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Role::A),
            "b" => Ok(Role::B),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Opaque identity bound to a role for one connection generation.
///
/// Freshly generated identities are UUID v4 in simple (hyphenless) form, but any
/// string read back from the store or supplied by a client is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The current owner of a role seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub role: Role,
    pub identity: Identity,
    /// Epoch millis of the assignment, absent for bindings written by older nodes.
    pub assigned_at: Option<i64>,
}
