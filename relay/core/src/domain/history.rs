// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Capped, time-ordered message history.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::message::MessageKind;
use super::role::Identity;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
pub const DEFAULT_MAX_PAGE: usize = 100;
pub const DEFAULT_PAGE: usize = 50;

/// Bucket a history entry lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HistoryScope {
    Public,
    Private(Identity),
}

impl HistoryScope {
    pub fn key(&self) -> String {
        match self {
            HistoryScope::Public => "chat:messages:public".to_string(),
            HistoryScope::Private(id) => format!("chat:messages:private:{id}"),
        }
    }
}

impl fmt::Display for HistoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Identity>,
    pub sender_name: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Identity>,
}

/// Capacity and paging limits applied to every scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub capacity: usize,
    pub max_page: usize,
    pub default_page: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            max_page: DEFAULT_MAX_PAGE,
            default_page: DEFAULT_PAGE,
        }
    }
}

/// A clamped page request. Offsets count backwards from the newest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    /// `limit < 1` falls back to the default page, anything above the maximum is
    /// capped, and negative offsets start from the newest entry.
    pub fn clamped(limit: i64, offset: i64, policy: &HistoryPolicy) -> Self {
        let limit = if limit < 1 {
            policy.default_page
        } else {
            (limit as u64).min(policy.max_page as u64) as usize
        };
        Self {
            limit,
            offset: offset.max(0) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_keys() {
        assert_eq!(HistoryScope::Public.key(), "chat:messages:public");
        assert_eq!(
            HistoryScope::Private(Identity::from("u1")).key(),
            "chat:messages:private:u1"
        );
    }

    #[test]
    fn test_page_clamping() {
        let policy = HistoryPolicy::default();
        assert_eq!(PageRequest::clamped(500, 0, &policy).limit, 100);
        assert_eq!(PageRequest::clamped(0, 0, &policy).limit, 50);
        assert_eq!(PageRequest::clamped(-3, -9, &policy), PageRequest { limit: 50, offset: 0 });
        assert_eq!(PageRequest::clamped(20, 40, &policy), PageRequest { limit: 20, offset: 40 });
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = ChatLogEntry {
            sender_id: Some("s".into()),
            sender_name: "Agent A".into(),
            content: "hey".into(),
            timestamp: 3,
            kind: MessageKind::Public,
            recipient_id: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "public");
        assert_eq!(json["senderName"], "Agent A");
        assert!(json.get("recipientId").is_none());
    }
}
