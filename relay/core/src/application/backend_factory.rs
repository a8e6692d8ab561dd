// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Backend Factory - Application Layer
//!
//! Creates the concrete shared-state backends for the configured storage
//! backend. The domain only sees the traits; this is the single place that
//! names the in-memory and Redis adapters.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select store, history, bus and queue implementations

use std::sync::Arc;
use tracing::info;

use crate::domain::clock::Clock;
use crate::domain::repository::{
    DelayedQueue, HistoryStore, MessageBus, SharedStateStore, StorageBackend,
};
use crate::infrastructure::redis::{
    RedisConnection, RedisDelayedQueue, RedisHistoryStore, RedisMessageBus, RedisStateStore,
};
use crate::infrastructure::{
    InMemoryDelayedQueue, InMemoryHistoryStore, InMemoryMessageBus, InMemoryStateStore,
};

/// The four shared-state seams a node is built on.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn SharedStateStore>,
    pub history: Arc<dyn HistoryStore>,
    pub bus: Arc<dyn MessageBus>,
    pub queue: Arc<dyn DelayedQueue>,
}

/// In-memory backends. Every node built from the same value shares state, so
/// several nodes can run inside one process.
pub fn create_in_memory_backends(clock: Arc<dyn Clock>) -> Backends {
    Backends {
        store: Arc::new(InMemoryStateStore::new(clock.clone())),
        history: Arc::new(InMemoryHistoryStore::new()),
        bus: Arc::new(InMemoryMessageBus::with_default_capacity()),
        queue: Arc::new(InMemoryDelayedQueue::new(clock)),
    }
}

/// Creates the backends for the configured storage backend
pub async fn create_backends(
    backend: &StorageBackend,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Backends> {
    match backend {
        StorageBackend::InMemory => {
            info!("Using in-memory backends (single node)");
            Ok(create_in_memory_backends(clock))
        }
        StorageBackend::Redis(config) => {
            let conn = RedisConnection::connect(config).await?;
            info!(url = %config.url, key_prefix = %config.key_prefix, "Connected to Redis backends");
            Ok(Backends {
                store: Arc::new(RedisStateStore::new(conn.clone())),
                history: Arc::new(RedisHistoryStore::new(conn.clone())),
                bus: Arc::new(RedisMessageBus::new(conn.clone())),
                queue: Arc::new(RedisDelayedQueue::new(conn, clock)),
            })
        }
    }
}
