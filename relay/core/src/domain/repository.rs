// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Contracts for the cluster-visible state every node shares. Business logic
//! only sees these traits; store-native scripting stays inside the
//! infrastructure adapters.
//!
//! | Trait | Holds | Implementations |
//! |-------|-------|----------------|
//! | `SharedStateStore` | role bindings, presence flags, heartbeats | `InMemoryStateStore`, `RedisStateStore` |
//! | `HistoryStore` | capped per-scope message logs | `InMemoryHistoryStore`, `RedisHistoryStore` |
//! | `MessageBus` | cross-node pub/sub fan-out | `InMemoryMessageBus`, `RedisMessageBus` |
//! | `DelayedQueue` | deferred rechecks and presence flips | `InMemoryDelayedQueue`, `RedisDelayedQueue` |
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at node startup from the
//! `spec.store.backend` setting. In-memory backends serve single-node
//! deployments and tests; Redis backends serve a cluster.

use async_trait::async_trait;
use futures::stream::Stream;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::heartbeat::DelayedTask;
use crate::domain::history::{ChatLogEntry, HistoryScope};

/// Storage backend enum for pluggable shared state
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    Redis(RedisConfig),
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Upper bound for any single store or bus round-trip.
    pub operation_timeout: Duration,
    /// Prepended to every key so several clusters can share one server.
    pub key_prefix: String,
}

/// Result of an atomic compare-and-assign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// No prior value existed.
    Created,
    /// The prior value equals the new one.
    Unchanged,
    /// A different prior value was overwritten.
    Replaced(String),
}

/// Key-value store shared by every node.
#[async_trait]
pub trait SharedStateStore: Send + Sync {
    /// Atomically install `value` under `key`, stamping `stamp_key` with
    /// `stamp`, and report what was there before. One indivisible step.
    async fn compare_and_assign(
        &self,
        key: &str,
        value: &str,
        stamp_key: &str,
        stamp: i64,
    ) -> Result<AssignOutcome, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Capped, ordered per-scope history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert scored by timestamp and trim to `capacity` in one atomic unit.
    async fn append(
        &self,
        scope: &HistoryScope,
        entry: &ChatLogEntry,
        capacity: usize,
    ) -> Result<(), StoreError>;

    /// Most recent first, skipping `offset` entries.
    async fn read(
        &self,
        scope: &HistoryScope,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, StoreError>;

    async fn len(&self, scope: &HistoryScope) -> Result<usize, StoreError>;
}

/// Channels on the cluster bus. Names must match across all nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusChannel {
    Broadcast,
    Targeted,
    Presence,
    Reassign,
}

impl BusChannel {
    pub const ALL: [BusChannel; 4] = [
        BusChannel::Broadcast,
        BusChannel::Targeted,
        BusChannel::Presence,
        BusChannel::Reassign,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BusChannel::Broadcast => "broadcast-channel",
            BusChannel::Targeted => "targeted-channel",
            BusChannel::Presence => "presence-channel",
            BusChannel::Reassign => "reassign-channel",
        }
    }
}

impl fmt::Display for BusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BusChannel {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BusChannel::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| BusError::UnknownChannel(s.to_string()))
    }
}

/// A raw message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEnvelope {
    pub channel: BusChannel,
    pub payload: String,
}

pub type BusStream = Pin<Box<dyn Stream<Item = BusEnvelope> + Send>>;

/// Publish/subscribe bus reachable by every node.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Returns the number of subscribers that received the message when the
    /// backend knows it.
    async fn publish(&self, channel: BusChannel, payload: String) -> Result<usize, BusError>;

    /// Subscribe to every [`BusChannel`]. Messages from one publisher arrive in
    /// publish order.
    async fn subscribe(&self) -> Result<BusStream, BusError>;
}

/// Queue that hands a task out only once its delay has elapsed.
#[async_trait]
pub trait DelayedQueue: Send + Sync {
    async fn schedule(&self, task: DelayedTask, delay: Duration) -> Result<(), QueueError>;

    /// Atomically claim up to `max` due tasks. A claimed task is never handed
    /// to another caller.
    async fn take_due(&self, max: usize) -> Result<Vec<DelayedTask>, QueueError>;

    async fn pending(&self) -> Result<usize, QueueError>;
}

/// Shared store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    #[error("Bus operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Bus is closed")]
    Closed,

    #[error("Unknown bus channel: {0}")]
    UnknownChannel(String),
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Unavailable(err.to_string())
    }
}

/// Delayed queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Queue operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_round_trip() {
        for channel in BusChannel::ALL {
            assert_eq!(channel.name().parse::<BusChannel>().unwrap(), channel);
        }
        assert_eq!(BusChannel::Broadcast.name(), "broadcast-channel");
        assert_eq!(BusChannel::Targeted.name(), "targeted-channel");
        assert!("nope".parse::<BusChannel>().is_err());
    }
}
