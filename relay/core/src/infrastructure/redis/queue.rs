// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Delayed-delivery queue on a Redis sorted set scored by due time.
//!
//! Claiming runs as one script, so each due task is handed to exactly one
//! node's worker even when every node polls the same queue.

use async_trait::async_trait;
use redis::Script;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::connection::RedisConnection;
use super::scripts;
use crate::domain::clock::Clock;
use crate::domain::heartbeat::DelayedTask;
use crate::domain::repository::{DelayedQueue, QueueError};

const QUEUE_KEY: &str = "relay:delayed";

/// Members carry a nonce so identical tasks scheduled twice stay distinct.
#[derive(Serialize, Deserialize)]
struct QueuedTask {
    nonce: String,
    #[serde(flatten)]
    task: DelayedTask,
}

pub struct RedisDelayedQueue {
    conn: RedisConnection,
    clock: Arc<dyn Clock>,
    claim_due: Script,
}

impl RedisDelayedQueue {
    pub fn new(conn: RedisConnection, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn,
            clock,
            claim_due: Script::new(scripts::CLAIM_DUE),
        }
    }
}

#[async_trait]
impl DelayedQueue for RedisDelayedQueue {
    async fn schedule(&self, task: DelayedTask, delay: Duration) -> Result<(), QueueError> {
        let due_at = self.clock.now_millis() + delay.as_millis() as i64;
        let member = serde_json::to_string(&QueuedTask {
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            task,
        })?;

        let mut con = self.conn.manager();
        let cmd = redis::cmd("ZADD")
            .arg(self.conn.key(QUEUE_KEY))
            .arg(due_at)
            .arg(member)
            .clone();
        let _: i64 = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(QueueError::Timeout)??;
        Ok(())
    }

    async fn take_due(&self, max: usize) -> Result<Vec<DelayedTask>, QueueError> {
        let mut con = self.conn.manager();
        let mut invocation = self.claim_due.prepare_invoke();
        invocation
            .key(self.conn.key(QUEUE_KEY))
            .arg(self.clock.now_millis())
            .arg(max);

        let members: Vec<String> = self
            .conn
            .bounded(invocation.invoke_async(&mut con))
            .await
            .map_err(QueueError::Timeout)??;

        Ok(members
            .iter()
            .filter_map(|raw| match serde_json::from_str::<QueuedTask>(raw) {
                Ok(queued) => Some(queued.task),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable delayed task");
                    None
                }
            })
            .collect())
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        let mut con = self.conn.manager();
        let cmd = redis::cmd("ZCARD").arg(self.conn.key(QUEUE_KEY)).clone();
        let size: usize = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(QueueError::Timeout)??;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::heartbeat::RecheckRequest;

    #[test]
    fn test_queued_task_is_flat() {
        let queued = QueuedTask {
            nonce: "n".to_string(),
            task: DelayedTask::Recheck(RecheckRequest {
                connection_id: "c".into(),
                observed_at: 1,
                attempt: 0,
            }),
        };
        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["nonce"], "n");
        assert_eq!(json["task"], "recheck");

        let back: QueuedTask = serde_json::from_value(json).unwrap();
        assert_eq!(back.task, queued.task);
    }
}
