// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use redis::Script;
use std::time::Duration;

use super::connection::RedisConnection;
use super::scripts;
use crate::domain::repository::{AssignOutcome, SharedStateStore, StoreError};

pub struct RedisStateStore {
    conn: RedisConnection,
    compare_and_assign: Script,
}

impl RedisStateStore {
    pub fn new(conn: RedisConnection) -> Self {
        Self {
            conn,
            compare_and_assign: Script::new(scripts::COMPARE_AND_ASSIGN),
        }
    }
}

fn parse_assign_reply(reply: Vec<String>) -> Result<AssignOutcome, StoreError> {
    let mut parts = reply.into_iter();
    match (parts.next().as_deref(), parts.next()) {
        (Some("created"), _) => Ok(AssignOutcome::Created),
        (Some("unchanged"), _) => Ok(AssignOutcome::Unchanged),
        (Some("replaced"), Some(prior)) => Ok(AssignOutcome::Replaced(prior)),
        (other, _) => Err(StoreError::Serialization(format!(
            "unexpected compare-and-assign reply: {other:?}"
        ))),
    }
}

#[async_trait]
impl SharedStateStore for RedisStateStore {
    async fn compare_and_assign(
        &self,
        key: &str,
        value: &str,
        stamp_key: &str,
        stamp: i64,
    ) -> Result<AssignOutcome, StoreError> {
        let mut con = self.conn.manager();
        let mut invocation = self.compare_and_assign.prepare_invoke();
        invocation
            .key(self.conn.key(key))
            .key(self.conn.key(stamp_key))
            .arg(value)
            .arg(stamp);

        let reply: Vec<String> = self
            .conn
            .bounded(invocation.invoke_async(&mut con))
            .await
            .map_err(StoreError::Timeout)??;
        parse_assign_reply(reply)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.conn.manager();
        let cmd = redis::cmd("GET").arg(self.conn.key(key)).clone();
        let value: Option<String> = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(StoreError::Timeout)??;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut con = self.conn.manager();
        let cmd = redis::cmd("SET")
            .arg(self.conn.key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .clone();
        let _: () = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(StoreError::Timeout)??;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut con = self.conn.manager();
        let cmd = redis::cmd("DEL").arg(self.conn.key(key)).clone();
        let _: i64 = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(StoreError::Timeout)??;
        Ok(())
    }
}
