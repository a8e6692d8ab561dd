// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Redis Backends
//!
//! Cluster implementations of the shared-state contracts. All nodes pointing
//! at the same Redis server (and key prefix) form one relay cluster.
//!
//! | Type | Contract | Redis structures |
//! |------|----------|------------------|
//! | `RedisStateStore` | `SharedStateStore` | strings, `SET PX`, CAS Lua script |
//! | `RedisHistoryStore` | `HistoryStore` | sorted set per scope, append+trim Lua script |
//! | `RedisMessageBus` | `MessageBus` | `PUBLISH` / `SUBSCRIBE` |
//! | `RedisDelayedQueue` | `DelayedQueue` | sorted set scored by due time, claim Lua script |
//!
//! Every round-trip is bounded by the configured operation timeout.

pub mod bus;
pub mod connection;
pub mod history;
pub mod queue;
mod scripts;
pub mod store;

pub use bus::RedisMessageBus;
pub use connection::RedisConnection;
pub use history::RedisHistoryStore;
pub use queue::RedisDelayedQueue;
pub use store::RedisStateStore;
