// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Table of sessions physically attached to this node.
//!
//! Each session owns a bounded outbound queue drained by its transport task.
//! Delivery never waits on a slow session: a full queue drops the frame.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::message::OutboundFrame;
use crate::domain::role::{Identity, Role};

pub const DEFAULT_SESSION_BUFFER: usize = 256;

#[derive(Clone)]
struct SessionHandle {
    session_id: u64,
    role: Role,
    sender: mpsc::Sender<OutboundFrame>,
}

/// Registration returned to the transport; keep it to deregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    pub session_id: u64,
}

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Identity, SessionHandle>>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_BUFFER)
    }
}

impl SessionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            buffer,
        }
    }

    pub fn register(
        &self,
        identity: Identity,
        role: Role,
    ) -> (SessionTicket, mpsc::Receiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self
            .sessions
            .insert(
                identity.clone(),
                SessionHandle {
                    session_id,
                    role,
                    sender,
                },
            )
            .is_some()
        {
            warn!(identity = %identity, "Replaced an existing local session with the same identity");
        }
        metrics::gauge!("relay_local_sessions").set(self.sessions.len() as f64);
        (SessionTicket { session_id }, receiver)
    }

    /// Remove the session only if it is still the one identified by `ticket`.
    pub fn deregister(&self, identity: &Identity, ticket: SessionTicket) -> bool {
        let removed = self
            .sessions
            .remove_if(identity, |_, handle| handle.session_id == ticket.session_id)
            .is_some();
        metrics::gauge!("relay_local_sessions").set(self.sessions.len() as f64);
        removed
    }

    /// Drop the session for `identity` whatever its ticket. Its outbound
    /// queue drains what it already holds and then ends, which closes the
    /// socket even when the queue was full.
    pub fn evict(&self, identity: &Identity) -> bool {
        let removed = self.sessions.remove(identity).is_some();
        metrics::gauge!("relay_local_sessions").set(self.sessions.len() as f64);
        removed
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.sessions.contains_key(identity)
    }

    pub fn role_of(&self, identity: &Identity) -> Option<Role> {
        self.sessions.get(identity).map(|h| h.role)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Deliver to one local session. Returns false if it is not attached here
    /// or could not accept the frame.
    pub fn send_to(&self, identity: &Identity, frame: OutboundFrame) -> bool {
        let Some(handle) = self.sessions.get(identity).map(|h| h.clone()) else {
            debug!(identity = %identity, "No local session for identity");
            return false;
        };
        Self::offer(identity, &handle, frame)
    }

    /// Deliver to every local session, returning how many accepted the frame.
    pub fn broadcast(&self, frame: &OutboundFrame) -> usize {
        let handles: Vec<(Identity, SessionHandle)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        handles
            .iter()
            .filter(|(identity, handle)| Self::offer(identity, handle, frame.clone()))
            .count()
    }

    fn offer(identity: &Identity, handle: &SessionHandle, frame: OutboundFrame) -> bool {
        match handle.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(identity = %identity, "Session outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(identity = %identity, "Session outbound queue closed");
                false
            }
        }
    }
}
