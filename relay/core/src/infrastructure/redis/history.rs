// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use redis::Script;
use serde::{Deserialize, Serialize};

use super::connection::RedisConnection;
use super::scripts;
use crate::domain::history::{ChatLogEntry, HistoryScope};
use crate::domain::repository::{HistoryStore, StoreError};

/// Members carry a nonce so two identical entries in the same millisecond
/// both count against the cap. Members written without one still read.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    #[serde(default)]
    nonce: String,
    #[serde(flatten)]
    entry: ChatLogEntry,
}

/// One sorted set per scope, scored by entry timestamp.
pub struct RedisHistoryStore {
    conn: RedisConnection,
    append_and_trim: Script,
}

impl RedisHistoryStore {
    pub fn new(conn: RedisConnection) -> Self {
        Self {
            conn,
            append_and_trim: Script::new(scripts::APPEND_AND_TRIM),
        }
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append(
        &self,
        scope: &HistoryScope,
        entry: &ChatLogEntry,
        capacity: usize,
    ) -> Result<(), StoreError> {
        let member = serde_json::to_string(&StoredEntry {
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            entry: entry.clone(),
        })?;
        let mut con = self.conn.manager();
        let mut invocation = self.append_and_trim.prepare_invoke();
        invocation
            .key(self.conn.key(&scope.key()))
            .arg(entry.timestamp)
            .arg(member)
            .arg(capacity);

        let _size: i64 = self
            .conn
            .bounded(invocation.invoke_async(&mut con))
            .await
            .map_err(StoreError::Timeout)??;
        Ok(())
    }

    async fn read(
        &self,
        scope: &HistoryScope,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut con = self.conn.manager();
        let cmd = redis::cmd("ZREVRANGE")
            .arg(self.conn.key(&scope.key()))
            .arg(offset)
            .arg(offset + limit - 1)
            .clone();
        let members: Vec<String> = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(StoreError::Timeout)??;

        // A corrupt member is skipped rather than failing the whole page
        Ok(members
            .iter()
            .filter_map(|raw| match serde_json::from_str::<StoredEntry>(raw) {
                Ok(stored) => Some(stored.entry),
                Err(e) => {
                    tracing::warn!(scope = %scope, error = %e, "Skipping unreadable history entry");
                    None
                }
            })
            .collect())
    }

    async fn len(&self, scope: &HistoryScope) -> Result<usize, StoreError> {
        let mut con = self.conn.manager();
        let cmd = redis::cmd("ZCARD").arg(self.conn.key(&scope.key())).clone();
        let size: usize = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(StoreError::Timeout)??;
        Ok(size)
    }
}
