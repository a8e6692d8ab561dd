// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Relay Core
//!
//! Cluster-consistent relay for two fixed agent seats (A and B). Every node is
//! stateless apart from its table of locally attached sessions; role bindings,
//! presence, heartbeats, history and deferred rechecks live in a shared store
//! reachable by all nodes, and cross-node fan-out goes over a pub/sub bus.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, storage backends and
//!   the HTTP/WebSocket presentation adapters used by the `agent-relay` binary

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
