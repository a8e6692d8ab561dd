// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # In-Memory Backends
//!
//! Process-local implementations of the shared-state contracts:
//!
//! - **InMemoryStateStore** - key/value map with clock-driven expiry
//! - **InMemoryHistoryStore** - per-scope ordered logs with capacity trim
//! - **InMemoryDelayedQueue** - due-ordered task map
//!
//! Every operation takes a single lock, which makes compare-and-assign,
//! append-and-trim and claim-due atomic in the same sense the Redis scripts
//! are. Expiry is evaluated lazily against the injected [`Clock`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::clock::Clock;
use crate::domain::heartbeat::DelayedTask;
use crate::domain::history::{ChatLogEntry, HistoryScope};
use crate::domain::repository::{
    AssignOutcome, DelayedQueue, HistoryStore, QueueError, SharedStateStore, StoreError,
};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<i64>,
}

impl StoredValue {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Clone)]
pub struct InMemoryStateStore {
    entries: Arc<Mutex<HashMap<String, StoredValue>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Expiry deadline of a live key, if it has one.
    pub fn expires_at(&self, key: &str) -> Option<i64> {
        let now = self.clock.now_millis();
        self.entries
            .lock()
            .get(key)
            .filter(|v| v.is_live(now))
            .and_then(|v| v.expires_at)
    }
}

#[async_trait]
impl SharedStateStore for InMemoryStateStore {
    async fn compare_and_assign(
        &self,
        key: &str,
        value: &str,
        stamp_key: &str,
        stamp: i64,
    ) -> Result<AssignOutcome, StoreError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        let prior = entries
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone());

        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: None,
            },
        );
        entries.insert(
            stamp_key.to_string(),
            StoredValue {
                value: stamp.to_string(),
                expires_at: None,
            },
        );

        Ok(match prior {
            None => AssignOutcome::Created,
            Some(prior) if prior == value => AssignOutcome::Unchanged,
            Some(prior) => AssignOutcome::Replaced(prior),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(v) if v.is_live(now) => Ok(Some(v.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.clock.now_millis() + ttl.as_millis() as i64;
        self.entries.lock().insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Entries are keyed by (timestamp, insertion sequence) so equal timestamps
/// keep their arrival order.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    scopes: Arc<Mutex<HashMap<HistoryScope, BTreeMap<(i64, u64), ChatLogEntry>>>>,
    sequence: Arc<Mutex<u64>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        scope: &HistoryScope,
        entry: &ChatLogEntry,
        capacity: usize,
    ) -> Result<(), StoreError> {
        let seq = {
            let mut seq = self.sequence.lock();
            *seq += 1;
            *seq
        };

        let mut scopes = self.scopes.lock();
        let log = scopes.entry(scope.clone()).or_default();
        log.insert((entry.timestamp, seq), entry.clone());
        while log.len() > capacity {
            log.pop_first();
        }
        Ok(())
    }

    async fn read(
        &self,
        scope: &HistoryScope,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, StoreError> {
        let scopes = self.scopes.lock();
        Ok(scopes
            .get(scope)
            .map(|log| log.values().rev().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn len(&self, scope: &HistoryScope) -> Result<usize, StoreError> {
        Ok(self.scopes.lock().get(scope).map_or(0, BTreeMap::len))
    }
}

struct QueueState {
    tasks: BTreeMap<(i64, u64), DelayedTask>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct InMemoryDelayedQueue {
    state: Arc<Mutex<QueueState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDelayedQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                tasks: BTreeMap::new(),
                next_seq: 0,
            })),
            clock,
        }
    }
}

#[async_trait]
impl DelayedQueue for InMemoryDelayedQueue {
    async fn schedule(&self, task: DelayedTask, delay: Duration) -> Result<(), QueueError> {
        let due_at = self.clock.now_millis() + delay.as_millis() as i64;
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.insert((due_at, seq), task);
        Ok(())
    }

    async fn take_due(&self, max: usize) -> Result<Vec<DelayedTask>, QueueError> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let mut due = Vec::new();
        while due.len() < max {
            match state.tasks.first_key_value() {
                Some((&(due_at, _), _)) if due_at <= now => {
                    if let Some((_, task)) = state.tasks.pop_first() {
                        due.push(task);
                    }
                }
                _ => break,
            }
        }
        Ok(due)
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().tasks.len())
    }
}

/// Store whose every call fails as if the server were unreachable.
#[cfg(test)]
pub(crate) struct UnavailableStateStore;

#[cfg(test)]
#[async_trait]
impl SharedStateStore for UnavailableStateStore {
    async fn compare_and_assign(
        &self,
        _key: &str,
        _value: &str,
        _stamp_key: &str,
        _stamp: i64,
    ) -> Result<AssignOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::heartbeat::RecheckRequest;
    use crate::domain::message::MessageKind;

    fn entry(ts: i64) -> ChatLogEntry {
        ChatLogEntry {
            sender_id: None,
            sender_name: "Agent A".to_string(),
            content: format!("m{ts}"),
            timestamp: ts,
            kind: MessageKind::Public,
            recipient_id: None,
        }
    }

    #[tokio::test]
    async fn test_compare_and_assign_outcomes() {
        let store = InMemoryStateStore::new(Arc::new(ManualClock::new(0)));
        assert_eq!(
            store.compare_and_assign("k", "v1", "k:at", 1).await.unwrap(),
            AssignOutcome::Created
        );
        assert_eq!(
            store.compare_and_assign("k", "v1", "k:at", 2).await.unwrap(),
            AssignOutcome::Unchanged
        );
        assert_eq!(
            store.compare_and_assign("k", "v2", "k:at", 3).await.unwrap(),
            AssignOutcome::Replaced("v1".to_string())
        );
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.get("k:at").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_expiry_follows_clock() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = InMemoryStateStore::new(clock.clone());
        store
            .set_with_expiry("status", "ONLINE", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(store.expires_at("status"), Some(31_000));

        clock.advance(29_999);
        assert!(store.get("status").await.unwrap().is_some());
        clock.advance(1);
        assert!(store.get("status").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_trim_keeps_newest() {
        let store = InMemoryHistoryStore::new();
        let scope = HistoryScope::Public;
        for ts in 0..15 {
            store.append(&scope, &entry(ts), 10).await.unwrap();
        }
        assert_eq!(store.len(&scope).await.unwrap(), 10);

        let page = store.read(&scope, 0, 3).await.unwrap();
        let stamps: Vec<i64> = page.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![14, 13, 12]);

        let tail = store.read(&scope, 8, 5).await.unwrap();
        let stamps: Vec<i64> = tail.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![6, 5]);
    }

    #[tokio::test]
    async fn test_history_out_of_order_append_sorts_by_timestamp() {
        let store = InMemoryHistoryStore::new();
        let scope = HistoryScope::Private("u".into());
        for ts in [5, 1, 3] {
            store.append(&scope, &entry(ts), 2).await.unwrap();
        }
        let page = store.read(&scope, 0, 10).await.unwrap();
        let stamps: Vec<i64> = page.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![5, 3]);
    }

    #[tokio::test]
    async fn test_delayed_queue_releases_only_due_tasks() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = InMemoryDelayedQueue::new(clock.clone());
        let task = |ts| {
            DelayedTask::Recheck(RecheckRequest {
                connection_id: "c".into(),
                observed_at: ts,
                attempt: 0,
            })
        };

        queue.schedule(task(1), Duration::from_secs(60)).await.unwrap();
        queue.schedule(task(2), Duration::from_secs(10)).await.unwrap();
        assert!(queue.take_due(10).await.unwrap().is_empty());

        clock.advance(10_000);
        assert_eq!(queue.take_due(10).await.unwrap(), vec![task(2)]);
        assert_eq!(queue.pending().await.unwrap(), 1);

        clock.advance(50_000);
        assert_eq!(queue.take_due(10).await.unwrap(), vec![task(1)]);
        assert!(queue.take_due(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delayed_queue_respects_batch_size() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = InMemoryDelayedQueue::new(clock);
        for _ in 0..5 {
            queue
                .schedule(
                    DelayedTask::MarkOnline {
                        identity: "i".into(),
                        attempt: 0,
                    },
                    Duration::ZERO,
                )
                .await
                .unwrap();
        }
        assert_eq!(queue.take_due(2).await.unwrap().len(), 2);
        assert_eq!(queue.pending().await.unwrap(), 3);
    }
}
