// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Relay messages, inbound client frames and outbound session frames.
//!
//! `content` is carried verbatim everywhere; escaping belongs to whatever
//! renders it.

use serde::{Deserialize, Serialize};

use super::events::{PresenceChangedEvent, RoleReassignedEvent};
use super::history::ChatLogEntry;
use super::role::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Public,
    Private,
}

/// Broadcast payload. Clients receive only `content`; the sender fields ride
/// along on the bus for history and are omitted when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastPayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl BroadcastPayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender_id: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetedMessage {
    /// Always [`MessageKind::Private`] on the wire.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub recipient_id: Identity,
    pub sender_id: Identity,
    pub sender_name: String,
    pub content: String,
    pub timestamp: i64,
}

impl TargetedMessage {
    pub fn new(
        content: impl Into<String>,
        sender_id: Identity,
        sender_name: impl Into<String>,
        recipient_id: Identity,
        timestamp: i64,
    ) -> Self {
        Self {
            kind: MessageKind::Private,
            recipient_id,
            sender_id,
            sender_name: sender_name.into(),
            content: content.into(),
            timestamp,
        }
    }
}

/// A message handed to the relay for cluster-wide fan-out. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Broadcast(BroadcastPayload),
    Targeted(TargetedMessage),
}

impl RelayMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            RelayMessage::Broadcast(_) => MessageKind::Public,
            RelayMessage::Targeted(_) => MessageKind::Private,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            RelayMessage::Broadcast(msg) => &msg.content,
            RelayMessage::Targeted(msg) => &msg.content,
        }
    }

    /// Projection persisted in the history log.
    pub fn to_log_entry(&self, sender_name: &str, now: i64) -> ChatLogEntry {
        match self {
            RelayMessage::Broadcast(msg) => ChatLogEntry {
                sender_id: msg.sender_id.clone(),
                sender_name: sender_name.to_string(),
                content: msg.content.clone(),
                timestamp: msg.timestamp.unwrap_or(now),
                kind: MessageKind::Public,
                recipient_id: None,
            },
            RelayMessage::Targeted(msg) => ChatLogEntry {
                sender_id: Some(msg.sender_id.clone()),
                sender_name: msg.sender_name.clone(),
                content: msg.content.clone(),
                timestamp: msg.timestamp,
                kind: MessageKind::Private,
                recipient_id: Some(msg.recipient_id.clone()),
            },
        }
    }
}

/// Frames a client may send over its duplex channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Broadcast to everyone.
    Message { content: String },
    /// Targeted message. The recipient is `id`, then `recipient`, then the sender.
    Private {
        content: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        recipient: Option<String>,
    },
    Heartbeat {
        #[serde(default, rename = "clientId")]
        client_id: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

impl ClientFrame {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Reply to a heartbeat, sent only to the connection that sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub content: String,
    pub client_id: Identity,
    pub timestamp: i64,
    pub status: super::presence::PresenceStatus,
}

impl HeartbeatAck {
    pub fn new(client_id: Identity, last_seen_at: i64) -> Self {
        Self {
            content: format!("Heartbeat received, last heartbeat time: {last_seen_at}"),
            client_id,
            timestamp: last_seen_at,
            status: super::presence::PresenceStatus::Online,
        }
    }
}

/// Plain text notice delivered to a single session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub content: String,
}

/// What a node pushes down to one of its local sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Broadcast(BroadcastPayload),
    Targeted(TargetedMessage),
    Presence(PresenceChangedEvent),
    /// The session's identity was superseded; followed by [`OutboundFrame::Close`].
    Reassigned {
        event: RoleReassignedEvent,
        notice: Notice,
    },
    HeartbeatAck(HeartbeatAck),
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targeted_wire_shape() {
        let msg = TargetedMessage::new("hi", "s1".into(), "Agent A", "r1".into(), 99);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "private",
                "recipientId": "r1",
                "senderId": "s1",
                "senderName": "Agent A",
                "content": "hi",
                "timestamp": 99
            })
        );
    }

    #[test]
    fn test_broadcast_serializes_content_only_when_sender_unknown() {
        let json = serde_json::to_string(&BroadcastPayload::new("hello")).unwrap();
        assert_eq!(json, r#"{"content":"hello"}"#);
    }

    #[test]
    fn test_parse_client_frames() {
        let frame = ClientFrame::parse(r#"{"type":"message","content":"x"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Message { content: "x".into() });

        let frame = ClientFrame::parse(r#"{"type":"private","content":"y","recipient":"r"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Private {
                content: "y".into(),
                id: None,
                recipient: Some("r".into())
            }
        );

        let frame = ClientFrame::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Heartbeat {
                client_id: None,
                timestamp: None
            }
        );

        assert!(ClientFrame::parse(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn test_log_entry_projection() {
        let msg = RelayMessage::Targeted(TargetedMessage::new(
            "<b>x</b>",
            "s".into(),
            "Agent B",
            "r".into(),
            7,
        ));
        let entry = msg.to_log_entry("ignored", 100);
        assert_eq!(entry.kind, MessageKind::Private);
        assert_eq!(entry.timestamp, 7);
        assert_eq!(entry.content, "<b>x</b>");
        assert_eq!(entry.recipient_id, Some(Identity::from("r")));
    }
}
