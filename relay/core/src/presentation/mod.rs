// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`agent-relay-core`)
//!
//! HTTP and WebSocket surface that translates external requests into
//! application service calls. No relay logic lives here; every decision is
//! delegated to the [`ConnectionGateway`](crate::application::ConnectionGateway).
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Health, role status, identity check and history endpoints |
//! | [`ws`] | WebSocket (Axum) | Client duplex channel and outbound frame envelopes |

pub mod api;
pub mod ws;

pub use api::{router, AppState};
