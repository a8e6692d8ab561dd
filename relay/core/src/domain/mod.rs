// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Pure types and repository contracts for the relay. Nothing in here talks to
//! a network or a runtime; infrastructure adapters implement the traits in
//! [`repository`].
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Roles, identities, presence, heartbeats, messages, history

pub mod clock;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod history;
pub mod message;
pub mod node_config;
pub mod presence;
pub mod repository;
pub mod role;
