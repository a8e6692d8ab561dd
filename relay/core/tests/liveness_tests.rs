// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Heartbeat timeouts and deferred rechecks driven through the delayed queue
//! with a manual clock.

use agent_relay_core::application::backend_factory::create_in_memory_backends;
use agent_relay_core::application::RelayNode;
use agent_relay_core::domain::clock::ManualClock;
use agent_relay_core::domain::heartbeat::RecheckOutcome;
use agent_relay_core::domain::message::OutboundFrame;
use agent_relay_core::domain::node_config::RelayConfigManifest;
use agent_relay_core::domain::presence::PresenceStatus;
use agent_relay_core::domain::role::Role;
use std::sync::Arc;
use std::time::Duration;

fn node(clock: Arc<ManualClock>) -> RelayNode {
    let mut config = RelayConfigManifest::default();
    config.spec.liveness.poll_interval_ms = 3_600_000;
    RelayNode::new(&config, create_in_memory_backends(clock.clone()), clock)
}

#[tokio::test]
async fn test_silent_connection_goes_offline_after_check_delay() {
    let clock = Arc::new(ManualClock::new(0));
    let node = node(clock.clone());
    node.start().await.unwrap();
    let gateway = node.gateway();

    let a = gateway.on_connect(Role::A).await.unwrap();
    let mut b = gateway.on_connect(Role::B).await.unwrap();
    gateway
        .on_client_frame(&a.identity, r#"{"type":"heartbeat"}"#)
        .await
        .unwrap();

    clock.set(60_000);
    let claimed = gateway.liveness().process_due().await.unwrap();
    assert_eq!(claimed, 3, "two ONLINE flips and one recheck");

    assert_eq!(
        gateway.role_status(Role::A).await.unwrap().status,
        PresenceStatus::Offline
    );
    assert_eq!(
        gateway.liveness().client_status(&a.identity).await.unwrap(),
        Some(PresenceStatus::Offline)
    );

    let offline = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match b.outbound.recv().await {
                Some(OutboundFrame::Presence(event))
                    if event.agent_type == Role::A && event.status == PresenceStatus::Offline =>
                {
                    return event
                }
                Some(_) => continue,
                None => panic!("session closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(offline.agent_name, "Agent A");

    node.shutdown().await;
}

#[tokio::test]
async fn test_steady_heartbeats_keep_connection_online() {
    let clock = Arc::new(ManualClock::new(0));
    let node = node(clock.clone());
    let gateway = node.gateway();
    let a = gateway.on_connect(Role::A).await.unwrap();

    for t in [250, 30_000, 60_000, 90_000, 120_000] {
        clock.set(t);
        gateway
            .on_client_frame(&a.identity, r#"{"type":"heartbeat"}"#)
            .await
            .unwrap();
        gateway.liveness().process_due().await.unwrap();
        assert_eq!(
            gateway.liveness().client_status(&a.identity).await.unwrap(),
            Some(PresenceStatus::Online),
            "connection flipped offline at t={t}"
        );
    }
}

#[tokio::test]
async fn test_recheck_after_newer_heartbeat_is_noop() {
    let clock = Arc::new(ManualClock::new(0));
    let node = node(clock.clone());
    let gateway = node.gateway();
    let a = gateway.on_connect(Role::A).await.unwrap();

    let first = gateway.liveness().record_heartbeat(&a.identity).await.unwrap();
    clock.set(10_000);
    gateway.liveness().record_heartbeat(&a.identity).await.unwrap();
    clock.set(60_000);

    let outcome = gateway
        .liveness()
        .handle_deferred_recheck(&a.identity, first.last_seen_at)
        .await
        .unwrap();
    assert_eq!(outcome, RecheckOutcome::Superseded);
    assert_eq!(
        gateway.liveness().client_status(&a.identity).await.unwrap(),
        Some(PresenceStatus::Online)
    );
}

#[tokio::test]
async fn test_stale_identity_timeout_leaves_new_holder_alone() {
    let clock = Arc::new(ManualClock::new(0));
    let node = node(clock.clone());
    let gateway = node.gateway();

    let old = gateway.on_connect(Role::B).await.unwrap();
    gateway.liveness().record_heartbeat(&old.identity).await.unwrap();
    let new = gateway.on_connect(Role::B).await.unwrap();

    clock.set(60_000);
    gateway.presence().mark_online(&new.identity).await.unwrap();
    let outcome = gateway
        .liveness()
        .handle_deferred_recheck(&old.identity, 0)
        .await
        .unwrap();
    assert_eq!(outcome, RecheckOutcome::TimedOut);
    assert_eq!(
        gateway.role_status(Role::B).await.unwrap().status,
        PresenceStatus::Online
    );
}
