// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! Services that implement the relay's behaviour on top of the domain
//! contracts, plus the factory and node wiring that select concrete backends.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Identity assignment, presence, relay, liveness, history

pub mod backend_factory;
pub mod connection_gateway;
pub mod history_log;
pub mod identity_registry;
pub mod liveness_monitor;
pub mod message_relay;
pub mod node;
pub mod presence_tracker;

pub use connection_gateway::{Connection, ConnectionGateway, RoleStatus};
pub use history_log::{HistoryLog, HistoryPage};
pub use identity_registry::{IdentityCheck, IdentityRegistry};
pub use liveness_monitor::LivenessMonitor;
pub use message_relay::MessageRelay;
pub use node::RelayNode;
pub use presence_tracker::PresenceTracker;
