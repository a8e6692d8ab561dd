// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capped history and pagination through the public API.

use agent_relay_core::application::HistoryLog;
use agent_relay_core::domain::history::{ChatLogEntry, HistoryPolicy, HistoryScope};
use agent_relay_core::domain::message::MessageKind;
use agent_relay_core::infrastructure::InMemoryHistoryStore;
use std::sync::Arc;

fn log(capacity: usize) -> HistoryLog {
    HistoryLog::new(
        Arc::new(InMemoryHistoryStore::new()),
        HistoryPolicy {
            capacity,
            ..HistoryPolicy::default()
        },
    )
}

fn entry(ts: i64) -> ChatLogEntry {
    ChatLogEntry {
        sender_id: Some("s".into()),
        sender_name: "Agent A".to_string(),
        content: format!("message {ts}"),
        timestamp: ts,
        kind: MessageKind::Public,
        recipient_id: None,
    }
}

#[tokio::test]
async fn test_overflow_keeps_most_recent_capacity_entries() {
    let log = log(10);
    for ts in 1..=25 {
        log.append(&HistoryScope::Public, &entry(ts)).await.unwrap();
    }

    assert_eq!(log.len(&HistoryScope::Public).await.unwrap(), 10);
    let page = log.read(&HistoryScope::Public, 100, 0).await.unwrap();
    let timestamps: Vec<i64> = page.entries.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, (16..=25).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_out_of_order_appends_are_read_by_timestamp() {
    let log = log(3);
    for ts in [50, 10, 40, 30, 20] {
        log.append(&HistoryScope::Public, &entry(ts)).await.unwrap();
    }
    let page = log.read(&HistoryScope::Public, 10, 0).await.unwrap();
    let timestamps: Vec<i64> = page.entries.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![50, 40, 30]);
}

#[tokio::test]
async fn test_pages_walk_newest_to_oldest() {
    let log = log(1000);
    for ts in 1..=120 {
        log.append(&HistoryScope::Public, &entry(ts)).await.unwrap();
    }

    let first = log.read(&HistoryScope::Public, 0, 0).await.unwrap();
    assert_eq!(first.limit, 50);
    assert_eq!(first.entries.first().map(|e| e.timestamp), Some(120));

    let last = log.read(&HistoryScope::Public, 50, 100).await.unwrap();
    assert_eq!(last.entries.len(), 20);
    assert_eq!(last.entries.last().map(|e| e.timestamp), Some(1));

    let beyond = log.read(&HistoryScope::Public, 50, 500).await.unwrap();
    assert!(beyond.entries.is_empty());
}

#[tokio::test]
async fn test_private_scopes_are_isolated() {
    let log = log(1000);
    let alice = HistoryScope::Private("alice".into());
    let bob = HistoryScope::Private("bob".into());
    log.append(&alice, &entry(1)).await.unwrap();

    assert_eq!(log.len(&alice).await.unwrap(), 1);
    assert_eq!(log.len(&bob).await.unwrap(), 0);
    assert_eq!(log.len(&HistoryScope::Public).await.unwrap(), 0);
}
