// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Relay error taxonomy.
//!
//! | Kind | Where it is fatal |
//! |------|-------------------|
//! | `StoreUnavailable` | identity assignment (connection is refused) |
//! | `Serialization` | never; the message is dropped |
//! | `DeliveryFailure` | never; logged and dropped, no retry |
//! | `QueueUnavailable` | never; the recheck is lost and presence expires passively |
//!
//! A stale recheck is a normal outcome, see
//! [`RecheckOutcome::Superseded`](crate::domain::heartbeat::RecheckOutcome).

use super::repository::{BusError, QueueError, StoreError};
use super::role::UnknownRole;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery failure: {0}")]
    DeliveryFailure(String),

    #[error("Delayed queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Serialization(msg) => RelayError::Serialization(msg),
            other => RelayError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<BusError> for RelayError {
    fn from(err: BusError) -> Self {
        RelayError::DeliveryFailure(err.to_string())
    }
}

impl From<QueueError> for RelayError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Serialization(msg) => RelayError::Serialization(msg),
            other => RelayError::QueueUnavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}
