// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Connection Gateway
//!
//! Entry point for everything a client does over its duplex channel:
//! connect, send frames, disconnect. The transport (WebSocket today) only
//! moves bytes; every decision lives here.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Per-connection lifecycle on top of the relay services

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::history_log::{HistoryLog, HistoryPage};
use crate::application::identity_registry::{IdentityCheck, IdentityRegistry};
use crate::application::liveness_monitor::LivenessMonitor;
use crate::application::message_relay::MessageRelay;
use crate::application::presence_tracker::PresenceTracker;
use crate::domain::error::RelayError;
use crate::domain::history::HistoryScope;
use crate::domain::message::{ClientFrame, HeartbeatAck, OutboundFrame};
use crate::domain::presence::PresenceStatus;
use crate::domain::role::{Identity, Role};
use crate::infrastructure::session_registry::{SessionRegistry, SessionTicket};

/// An accepted connection. `outbound` yields every frame this node pushes to
/// the session. When the session is superseded the stream ends, after an
/// [`OutboundFrame::Close`] if the queue had room for one.
#[derive(Debug)]
pub struct Connection {
    pub role: Role,
    pub identity: Identity,
    pub ticket: SessionTicket,
    pub outbound: mpsc::Receiver<OutboundFrame>,
}

/// Role snapshot served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleStatus {
    pub agent_type: Role,
    pub agent_name: String,
    pub agent_id: Option<Identity>,
    pub status: PresenceStatus,
}

pub struct ConnectionGateway {
    registry: Arc<IdentityRegistry>,
    presence: Arc<PresenceTracker>,
    relay: Arc<MessageRelay>,
    liveness: Arc<LivenessMonitor>,
    history: Arc<HistoryLog>,
    sessions: SessionRegistry,
}

impl ConnectionGateway {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        presence: Arc<PresenceTracker>,
        relay: Arc<MessageRelay>,
        liveness: Arc<LivenessMonitor>,
        history: Arc<HistoryLog>,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            registry,
            presence,
            relay,
            liveness,
            history,
            sessions,
        }
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn relay(&self) -> &Arc<MessageRelay> {
        &self.relay
    }

    pub fn liveness(&self) -> &Arc<LivenessMonitor> {
        &self.liveness
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Assign a fresh identity for `role`, attach the session locally and
    /// queue its ONLINE flip. Fails only when the identity cannot be
    /// assigned; the caller must refuse the connection.
    pub async fn on_connect(&self, role: Role) -> Result<Connection, RelayError> {
        let identity = self.registry.assign_identity(role).await?;
        let (ticket, outbound) = self.sessions.register(identity.clone(), role);

        if let Err(e) = self.presence.schedule_online(&identity).await {
            warn!(identity = %identity, error = %e, "Could not defer ONLINE flip, applying it now");
            if let Err(e) = self.presence.mark_online(&identity).await {
                warn!(identity = %identity, error = %e, "Failed to mark connection online");
            }
        }

        info!(role = %role, identity = %identity, "Connection established");
        Ok(Connection {
            role,
            identity,
            ticket,
            outbound,
        })
    }

    /// Detach the session and flip its role offline. A stale identity (one
    /// already superseded) leaves the newer holder's presence untouched.
    pub async fn on_disconnect(&self, identity: &Identity, ticket: SessionTicket) {
        if !self.sessions.deregister(identity, ticket) {
            debug!(identity = %identity, "Session already replaced locally");
        }
        match self.presence.mark_offline(identity).await {
            Ok(Some(_)) => info!(identity = %identity, "Connection closed"),
            Ok(None) => debug!(identity = %identity, "Closed connection held no role"),
            Err(e) => warn!(identity = %identity, error = %e, "Failed to mark connection offline"),
        }
    }

    /// Handle one raw frame from `identity`. Unreadable frames and empty
    /// content are dropped; a failed publish is reported to the caller.
    pub async fn on_client_frame(&self, identity: &Identity, raw: &str) -> Result<(), RelayError> {
        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Ignoring unreadable client frame");
                metrics::counter!("relay_malformed_payloads_total").increment(1);
                return Ok(());
            }
        };

        match frame {
            ClientFrame::Message { content } => {
                if content.trim().is_empty() {
                    return Ok(());
                }
                self.relay.publish_broadcast(&content, identity).await
            }
            ClientFrame::Private {
                content,
                id,
                recipient,
            } => {
                if content.trim().is_empty() {
                    return Ok(());
                }
                let recipient = id
                    .or(recipient)
                    .filter(|r| !r.is_empty())
                    .map(Identity::from)
                    .unwrap_or_else(|| identity.clone());
                let sender_name = self.registry.display_name_for(identity).await;
                self.relay
                    .publish_targeted(&content, identity, &sender_name, &recipient)
                    .await
            }
            ClientFrame::Heartbeat { client_id, .. } => {
                let connection_id = client_id
                    .filter(|c| !c.is_empty())
                    .map(Identity::from)
                    .unwrap_or_else(|| identity.clone());
                let record = self.liveness.record_heartbeat(&connection_id).await?;
                let ack = HeartbeatAck::new(connection_id, record.last_seen_at);
                self.sessions
                    .send_to(identity, OutboundFrame::HeartbeatAck(ack));
                Ok(())
            }
        }
    }

    /// Current holder and presence of `role`. A missing or expired flag reads
    /// as OFFLINE.
    pub async fn role_status(&self, role: Role) -> Result<RoleStatus, RelayError> {
        let agent_id = self.registry.current_identity(role).await?;
        let status = self
            .presence
            .get_status(role)
            .await?
            .unwrap_or(PresenceStatus::Offline);
        Ok(RoleStatus {
            agent_type: role,
            agent_name: role.display_name().to_string(),
            agent_id,
            status,
        })
    }

    pub async fn check_identity_validity(
        &self,
        role: Role,
        identity: &Identity,
    ) -> Result<IdentityCheck, RelayError> {
        self.registry.check_identity_validity(role, identity).await
    }

    pub async fn history(
        &self,
        scope: &HistoryScope,
        limit: i64,
        offset: i64,
    ) -> Result<HistoryPage, RelayError> {
        self.history.read(scope, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::history::HistoryPolicy;
    use crate::domain::node_config::{LivenessConfig, PresenceConfig};
    use crate::domain::repository::DelayedQueue;
    use crate::infrastructure::{
        InMemoryDelayedQueue, InMemoryHistoryStore, InMemoryMessageBus, InMemoryStateStore,
    };

    struct Fixture {
        clock: Arc<ManualClock>,
        queue: Arc<InMemoryDelayedQueue>,
        gateway: ConnectionGateway,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(InMemoryStateStore::new(clock.clone()));
        let bus = Arc::new(InMemoryMessageBus::new(64));
        let queue = Arc::new(InMemoryDelayedQueue::new(clock.clone()));
        let sessions = SessionRegistry::default();
        let registry = Arc::new(IdentityRegistry::new(store.clone(), bus.clone(), clock.clone()));
        let history = Arc::new(HistoryLog::new(
            Arc::new(InMemoryHistoryStore::new()),
            HistoryPolicy::default(),
        ));
        let presence = Arc::new(PresenceTracker::new(
            store.clone(),
            bus.clone(),
            queue.clone(),
            registry.clone(),
            clock.clone(),
            PresenceConfig::default(),
        ));
        let relay = Arc::new(MessageRelay::new(
            bus,
            registry.clone(),
            history.clone(),
            sessions.clone(),
            clock.clone(),
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            store,
            queue.clone(),
            presence.clone(),
            clock.clone(),
            LivenessConfig::default(),
        ));
        Fixture {
            clock,
            queue,
            gateway: ConnectionGateway::new(registry, presence, relay, liveness, history, sessions),
        }
    }

    #[tokio::test]
    async fn test_connect_registers_session_and_defers_online() {
        let f = fixture();
        let conn = f.gateway.on_connect(Role::A).await.unwrap();
        assert!(f.gateway.sessions().contains(&conn.identity));
        assert_eq!(f.queue.pending().await.unwrap(), 1);

        let status = f.gateway.role_status(Role::A).await.unwrap();
        assert_eq!(status.agent_id, Some(conn.identity.clone()));
        assert_eq!(status.status, PresenceStatus::Offline);

        f.clock.advance(250);
        f.gateway.liveness().process_due().await.unwrap();
        let status = f.gateway.role_status(Role::A).await.unwrap();
        assert_eq!(status.status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn test_stale_disconnect_leaves_new_holder_online() {
        let f = fixture();
        let first = f.gateway.on_connect(Role::B).await.unwrap();
        let second = f.gateway.on_connect(Role::B).await.unwrap();
        f.gateway.presence().mark_online(&second.identity).await.unwrap();

        f.gateway.on_disconnect(&first.identity, first.ticket).await;
        let status = f.gateway.role_status(Role::B).await.unwrap();
        assert_eq!(status.status, PresenceStatus::Online);
        assert_eq!(status.agent_id, Some(second.identity));
    }

    #[tokio::test]
    async fn test_heartbeat_ack_goes_to_sender_only() {
        let f = fixture();
        let mut a = f.gateway.on_connect(Role::A).await.unwrap();
        let mut b = f.gateway.on_connect(Role::B).await.unwrap();

        f.gateway
            .on_client_frame(&a.identity, r#"{"type":"heartbeat","timestamp":5}"#)
            .await
            .unwrap();

        match a.outbound.try_recv().unwrap() {
            OutboundFrame::HeartbeatAck(ack) => {
                assert_eq!(ack.client_id, a.identity);
                assert_eq!(ack.timestamp, 1_000);
                assert_eq!(ack.status, PresenceStatus::Online);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(b.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_private_without_recipient_goes_to_sender_history() {
        let f = fixture();
        let a = f.gateway.on_connect(Role::A).await.unwrap();
        f.gateway
            .on_client_frame(&a.identity, r#"{"type":"private","content":"note to self"}"#)
            .await
            .unwrap();

        let page = f
            .gateway
            .history(&HistoryScope::Private(a.identity.clone()), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].recipient_id, Some(a.identity.clone()));
        assert_eq!(page.entries[0].sender_name, "Agent A");
    }

    #[tokio::test]
    async fn test_empty_and_unreadable_frames_are_ignored() {
        let f = fixture();
        let a = f.gateway.on_connect(Role::A).await.unwrap();
        f.gateway
            .on_client_frame(&a.identity, r#"{"type":"message","content":""}"#)
            .await
            .unwrap();
        f.gateway.on_client_frame(&a.identity, "not json").await.unwrap();

        let page = f.gateway.history(&HistoryScope::Public, 10, 0).await.unwrap();
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn test_identity_check_after_reconnect() {
        let f = fixture();
        let first = f.gateway.on_connect(Role::A).await.unwrap();
        let second = f.gateway.on_connect(Role::A).await.unwrap();

        let stale = f
            .gateway
            .check_identity_validity(Role::A, &first.identity)
            .await
            .unwrap();
        assert!(!stale.is_valid);
        assert_eq!(stale.valid_identity, Some(second.identity.clone()));

        let current = f
            .gateway
            .check_identity_validity(Role::A, &second.identity)
            .await
            .unwrap();
        assert!(current.is_valid);
    }
}
