// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod memory;
pub mod redis;
pub mod session_registry;

pub use event_bus::InMemoryMessageBus;
pub use memory::{InMemoryDelayedQueue, InMemoryHistoryStore, InMemoryStateStore};
pub use session_registry::SessionRegistry;
