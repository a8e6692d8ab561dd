// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! History Log
//!
//! Capped, time-ordered per-scope message history with clamped pagination.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::error::RelayError;
use crate::domain::history::{ChatLogEntry, HistoryPolicy, HistoryScope, PageRequest};
use crate::domain::repository::HistoryStore;

/// One page of history, newest first, with the limits actually applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<ChatLogEntry>,
    pub limit: usize,
    pub offset: usize,
}

pub struct HistoryLog {
    store: Arc<dyn HistoryStore>,
    policy: HistoryPolicy,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn HistoryStore>, policy: HistoryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &HistoryPolicy {
        &self.policy
    }

    pub async fn append(&self, scope: &HistoryScope, entry: &ChatLogEntry) -> Result<(), RelayError> {
        self.store
            .append(scope, entry, self.policy.capacity)
            .await
            .map_err(RelayError::from)
    }

    pub async fn read(
        &self,
        scope: &HistoryScope,
        limit: i64,
        offset: i64,
    ) -> Result<HistoryPage, RelayError> {
        let page = PageRequest::clamped(limit, offset, &self.policy);
        let entries = self.store.read(scope, page.offset, page.limit).await?;
        Ok(HistoryPage {
            entries,
            limit: page.limit,
            offset: page.offset,
        })
    }

    pub async fn len(&self, scope: &HistoryScope) -> Result<usize, RelayError> {
        Ok(self.store.len(scope).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;
    use crate::infrastructure::InMemoryHistoryStore;

    fn entry(ts: i64) -> ChatLogEntry {
        ChatLogEntry {
            sender_id: Some("s".into()),
            sender_name: "Agent A".to_string(),
            content: format!("#{ts}"),
            timestamp: ts,
            kind: MessageKind::Public,
            recipient_id: None,
        }
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let log = HistoryLog::new(
            Arc::new(InMemoryHistoryStore::new()),
            HistoryPolicy {
                capacity: 5,
                ..HistoryPolicy::default()
            },
        );
        for ts in 1..=12 {
            log.append(&HistoryScope::Public, &entry(ts)).await.unwrap();
        }
        assert_eq!(log.len(&HistoryScope::Public).await.unwrap(), 5);

        let page = log.read(&HistoryScope::Public, 50, 0).await.unwrap();
        let stamps: Vec<i64> = page.entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![12, 11, 10, 9, 8]);
    }

    #[tokio::test]
    async fn test_read_clamps_paging() {
        let log = HistoryLog::new(Arc::new(InMemoryHistoryStore::new()), HistoryPolicy::default());
        for ts in 0..120 {
            log.append(&HistoryScope::Public, &entry(ts)).await.unwrap();
        }

        let page = log.read(&HistoryScope::Public, 1_000, -5).await.unwrap();
        assert_eq!(page.limit, 100);
        assert_eq!(page.offset, 0);
        assert_eq!(page.entries.len(), 100);
        assert_eq!(page.entries[0].timestamp, 119);

        let page = log.read(&HistoryScope::Public, 0, 100).await.unwrap();
        assert_eq!(page.limit, 50);
        assert_eq!(page.entries.len(), 20);
        assert_eq!(page.entries[0].timestamp, 19);
    }

    #[tokio::test]
    async fn test_empty_scope_reads_empty() {
        let log = HistoryLog::new(Arc::new(InMemoryHistoryStore::new()), HistoryPolicy::default());
        let page = log
            .read(&HistoryScope::Private("nobody".into()), 10, 0)
            .await
            .unwrap();
        assert!(page.entries.is_empty());
    }
}
