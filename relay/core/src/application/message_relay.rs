// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message Relay
//!
//! Publishes broadcast and targeted messages onto the cluster bus and, on
//! every node, re-delivers what arrives from the bus to the sessions attached
//! to that node only. Presence changes and role reassignments ride the same
//! subscription.
//!
//! One subscriber task per node consumes the bus sequentially, which keeps
//! each publisher's messages in publish order. Malformed payloads are logged
//! and dropped; they never stop the loop.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cross-node fan-out without node-to-node links

use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::history_log::HistoryLog;
use crate::application::identity_registry::IdentityRegistry;
use crate::domain::clock::Clock;
use crate::domain::error::RelayError;
use crate::domain::events::{PresenceChangedEvent, RoleReassignedEvent};
use crate::domain::history::HistoryScope;
use crate::domain::message::{
    BroadcastPayload, Notice, OutboundFrame, RelayMessage, TargetedMessage,
};
use crate::domain::repository::{BusChannel, BusEnvelope, MessageBus};
use crate::domain::role::Identity;
use crate::infrastructure::session_registry::SessionRegistry;

pub struct MessageRelay {
    bus: Arc<dyn MessageBus>,
    registry: Arc<IdentityRegistry>,
    history: Arc<HistoryLog>,
    sessions: SessionRegistry,
    clock: Arc<dyn Clock>,
    shutdown_token: CancellationToken,
}

impl MessageRelay {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<IdentityRegistry>,
        history: Arc<HistoryLog>,
        sessions: SessionRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bus,
            registry,
            history,
            sessions,
            clock,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub async fn publish_broadcast(&self, content: &str, sender_id: &Identity) -> Result<(), RelayError> {
        let message = RelayMessage::Broadcast(BroadcastPayload {
            content: content.to_string(),
            sender_id: Some(sender_id.clone()),
            timestamp: Some(self.clock.now_millis()),
        });
        self.publish(message).await
    }

    pub async fn publish_targeted(
        &self,
        content: &str,
        sender_id: &Identity,
        sender_name: &str,
        recipient_id: &Identity,
    ) -> Result<(), RelayError> {
        let message = RelayMessage::Targeted(TargetedMessage::new(
            content,
            sender_id.clone(),
            sender_name,
            recipient_id.clone(),
            self.clock.now_millis(),
        ));
        self.publish(message).await
    }

    /// Serialize, publish, then record in history. A failed publish is a
    /// delivery failure: logged, counted and dropped without retry.
    pub async fn publish(&self, message: RelayMessage) -> Result<(), RelayError> {
        let (channel, payload, kind) = match &message {
            RelayMessage::Broadcast(msg) => (BusChannel::Broadcast, serde_json::to_string(msg)?, "broadcast"),
            RelayMessage::Targeted(msg) => (BusChannel::Targeted, serde_json::to_string(msg)?, "targeted"),
        };

        if let Err(e) = self.bus.publish(channel, payload).await {
            warn!(channel = %channel, error = %e, "Dropping message after failed publish");
            metrics::counter!("relay_delivery_failures_total", "kind" => kind).increment(1);
            return Err(e.into());
        }
        metrics::counter!("relay_messages_published_total", "kind" => kind).increment(1);

        self.record_history(&message).await;
        Ok(())
    }

    async fn record_history(&self, message: &RelayMessage) {
        let now = self.clock.now_millis();
        let (entry, scopes) = match message {
            RelayMessage::Broadcast(msg) => {
                let sender_name = match &msg.sender_id {
                    Some(id) => self.registry.display_name_for(id).await,
                    None => crate::application::identity_registry::UNKNOWN_SENDER_NAME.to_string(),
                };
                (message.to_log_entry(&sender_name, now), vec![HistoryScope::Public])
            }
            RelayMessage::Targeted(msg) => {
                let mut scopes = vec![HistoryScope::Private(msg.sender_id.clone())];
                if msg.recipient_id != msg.sender_id {
                    scopes.push(HistoryScope::Private(msg.recipient_id.clone()));
                }
                (message.to_log_entry(&msg.sender_name, now), scopes)
            }
        };

        for scope in scopes {
            if let Err(e) = self.history.append(&scope, &entry).await {
                warn!(scope = %scope, error = %e, "Failed to record message history");
            }
        }
    }

    /// Deliver one bus message to local sessions. Returns the number of
    /// sessions that accepted it.
    pub fn handle_envelope(&self, envelope: &BusEnvelope) -> usize {
        let delivered = match envelope.channel {
            BusChannel::Broadcast => decode::<BroadcastPayload>(envelope)
                .map(|msg| self.sessions.broadcast(&OutboundFrame::Broadcast(msg)))
                .unwrap_or(0),
            BusChannel::Targeted => decode::<TargetedMessage>(envelope)
                .map(|msg| {
                    let recipient = msg.recipient_id.clone();
                    if !self.sessions.contains(&recipient) {
                        // Attached to another node, or gone
                        debug!(recipient = %recipient, "Targeted message has no local recipient");
                        return 0;
                    }
                    usize::from(self.sessions.send_to(&recipient, OutboundFrame::Targeted(msg)))
                })
                .unwrap_or(0),
            BusChannel::Presence => decode::<PresenceChangedEvent>(envelope)
                .map(|event| self.sessions.broadcast(&OutboundFrame::Presence(event)))
                .unwrap_or(0),
            BusChannel::Reassign => decode::<RoleReassignedEvent>(envelope)
                .map(|event| self.notify_superseded(event))
                .unwrap_or(0),
        };

        metrics::counter!("relay_deliveries_total", "channel" => envelope.channel.name())
            .increment(delivered as u64);
        delivered
    }

    fn notify_superseded(&self, event: RoleReassignedEvent) -> usize {
        let old_id = event.old_id.clone();
        if !self.sessions.contains(&old_id) {
            return 0;
        }
        info!(
            role = %event.agent_type,
            old_identity = %old_id,
            new_identity = %event.new_id,
            "Notifying superseded local session"
        );
        let notice = Notice {
            content: event.notice_text(),
        };
        let delivered = self
            .sessions
            .send_to(&old_id, OutboundFrame::Reassigned { event, notice });
        self.sessions.send_to(&old_id, OutboundFrame::Close);
        // A full queue may have refused both frames; ending the stream
        // still closes the socket
        self.sessions.evict(&old_id);
        usize::from(delivered)
    }

    /// Subscribe to the bus and start the delivery loop.
    ///
    /// The subscription is established before this returns, so anything
    /// published afterwards reaches this node.
    pub async fn start(self: Arc<Self>) -> Result<tokio::task::JoinHandle<()>, RelayError> {
        let mut stream = self.bus.subscribe().await?;
        info!("Message relay subscribed to bus");

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = stream.next() => match next {
                        Some(envelope) => {
                            self.handle_envelope(&envelope);
                        }
                        None => {
                            error!("Bus subscription closed, message relay stopping");
                            break;
                        }
                    },
                    _ = self.shutdown_token.cancelled() => {
                        info!("Message relay shutting down");
                        break;
                    }
                }
            }
        }))
    }
}

fn decode<T: DeserializeOwned>(envelope: &BusEnvelope) -> Option<T> {
    match serde_json::from_str(&envelope.payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(channel = %envelope.channel, error = %e, "Dropping malformed bus payload");
            metrics::counter!("relay_malformed_payloads_total").increment(1);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::history::HistoryPolicy;
    use crate::domain::role::Role;
    use crate::infrastructure::{InMemoryHistoryStore, InMemoryMessageBus, InMemoryStateStore};

    struct Fixture {
        bus: InMemoryMessageBus,
        registry: Arc<IdentityRegistry>,
        history: Arc<HistoryLog>,
        sessions: SessionRegistry,
        relay: MessageRelay,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(500));
        let bus = InMemoryMessageBus::new(32);
        let registry = Arc::new(IdentityRegistry::new(
            Arc::new(InMemoryStateStore::new(clock.clone())),
            Arc::new(bus.clone()),
            clock.clone(),
        ));
        let history = Arc::new(HistoryLog::new(
            Arc::new(InMemoryHistoryStore::new()),
            HistoryPolicy::default(),
        ));
        let sessions = SessionRegistry::default();
        let relay = MessageRelay::new(
            Arc::new(bus.clone()),
            registry.clone(),
            history.clone(),
            sessions.clone(),
            clock,
        );
        Fixture {
            bus,
            registry,
            history,
            sessions,
            relay,
        }
    }

    fn envelope(channel: BusChannel, payload: &str) -> BusEnvelope {
        BusEnvelope {
            channel,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_targeted_without_local_recipient_delivers_nothing() {
        let f = fixture();
        let (_, _rx) = f.sessions.register("someone-else".into(), Role::A);
        let msg = TargetedMessage::new("hi", "s".into(), "Agent A", "elsewhere".into(), 1);
        let delivered = f
            .relay
            .handle_envelope(&envelope(BusChannel::Targeted, &serde_json::to_string(&msg).unwrap()));
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_targeted_reaches_only_recipient() {
        let f = fixture();
        let (_, mut rx_r) = f.sessions.register("r".into(), Role::B);
        let (_, mut rx_other) = f.sessions.register("o".into(), Role::A);
        let msg = TargetedMessage::new("psst", "s".into(), "Agent A", "r".into(), 1);

        let delivered = f
            .relay
            .handle_envelope(&envelope(BusChannel::Targeted, &serde_json::to_string(&msg).unwrap()));
        assert_eq!(delivered, 1);
        assert_eq!(rx_r.recv().await, Some(OutboundFrame::Targeted(msg)));
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let f = fixture();
        let (_, mut rx) = f.sessions.register("x".into(), Role::A);
        assert_eq!(f.relay.handle_envelope(&envelope(BusChannel::Broadcast, "{not json")), 0);
        assert_eq!(f.relay.handle_envelope(&envelope(BusChannel::Presence, "[]")), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reassign_notifies_and_closes_old_session() {
        let f = fixture();
        let (_, mut rx_old) = f.sessions.register("old".into(), Role::A);
        let event = RoleReassignedEvent::new(Role::A, "old".into(), "new".into(), 9);

        let delivered = f
            .relay
            .handle_envelope(&envelope(BusChannel::Reassign, &serde_json::to_string(&event).unwrap()));
        assert_eq!(delivered, 1);

        match rx_old.recv().await {
            Some(OutboundFrame::Reassigned { event: got, notice }) => {
                assert_eq!(got, event);
                assert!(notice.content.contains("new"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(rx_old.recv().await, Some(OutboundFrame::Close));
        assert_eq!(rx_old.recv().await, None);
        assert!(!f.sessions.contains(&"old".into()));
    }

    #[tokio::test]
    async fn test_reassign_closes_session_with_full_queue() {
        let mut f = fixture();
        f.sessions = SessionRegistry::new(1);
        let relay = MessageRelay::new(
            Arc::new(f.bus.clone()),
            f.registry.clone(),
            f.history.clone(),
            f.sessions.clone(),
            Arc::new(ManualClock::new(0)),
        );
        let (_, mut rx_old) = f.sessions.register("old".into(), Role::A);
        let filler = OutboundFrame::Broadcast(BroadcastPayload::new("backlog"));
        assert_eq!(f.sessions.broadcast(&filler), 1);

        let event = RoleReassignedEvent::new(Role::A, "old".into(), "new".into(), 9);
        let delivered =
            relay.handle_envelope(&envelope(BusChannel::Reassign, &serde_json::to_string(&event).unwrap()));
        assert_eq!(delivered, 0);
        assert!(!f.sessions.contains(&"old".into()));

        assert_eq!(rx_old.recv().await, Some(filler));
        assert_eq!(rx_old.recv().await, None);
    }

    #[tokio::test]
    async fn test_publish_records_history_in_both_private_scopes() {
        let f = fixture();
        let sender = f.registry.assign_identity(Role::A).await.unwrap();
        let recipient = f.registry.assign_identity(Role::B).await.unwrap();

        f.relay
            .publish_targeted("hello", &sender, "Agent A", &recipient)
            .await
            .unwrap();
        f.relay.publish_broadcast("everyone", &sender).await.unwrap();

        for id in [&sender, &recipient] {
            let page = f
                .history
                .read(&HistoryScope::Private(id.clone()), 10, 0)
                .await
                .unwrap();
            assert_eq!(page.entries.len(), 1);
            assert_eq!(page.entries[0].content, "hello");
        }

        let public = f.history.read(&HistoryScope::Public, 10, 0).await.unwrap();
        assert_eq!(public.entries.len(), 1);
        assert_eq!(public.entries[0].sender_name, "Agent A");
    }

    #[tokio::test]
    async fn test_loop_delivers_in_publish_order() {
        let f = fixture();
        let relay = Arc::new(f.relay);
        let handle = relay.clone().start().await.unwrap();
        let (_, mut rx) = f.sessions.register("listener".into(), Role::B);

        for i in 0..5 {
            relay
                .publish_broadcast(&format!("m{i}"), &"listener".into())
                .await
                .unwrap();
        }
        for i in 0..5 {
            match rx.recv().await {
                Some(OutboundFrame::Broadcast(msg)) => assert_eq!(msg.content, format!("m{i}")),
                other => panic!("unexpected frame {other:?}"),
            }
        }

        relay.shutdown_token().cancel();
        handle.await.unwrap();
        assert_eq!(f.bus.subscriber_count(), 0);
    }
}
