// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Liveness Monitor
//!
//! Records heartbeats and detects silent disconnects without a timer per
//! connection. Each heartbeat schedules one deferred recheck on the delayed
//! queue; when it comes due, the recheck re-reads the heartbeat record and
//! flips the connection offline if nothing fresher arrived in time.
//!
//! The same worker drains every [`DelayedTask`], including the deferred
//! ONLINE flips queued at connect. A task whose handler fails is requeued
//! once; a second failure discards it.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Heartbeat ingest, deferred rechecks, delayed task worker

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::presence_tracker::PresenceTracker;
use crate::domain::clock::Clock;
use crate::domain::error::RelayError;
use crate::domain::heartbeat::{
    client_status_key, heartbeat_key, DelayedTask, HeartbeatRecord, RecheckOutcome, RecheckRequest,
};
use crate::domain::node_config::LivenessConfig;
use crate::domain::presence::PresenceStatus;
use crate::domain::repository::{DelayedQueue, SharedStateStore};
use crate::domain::role::Identity;

/// Attempts after which a failing task is discarded.
const MAX_TASK_ATTEMPTS: u32 = 2;

pub struct LivenessMonitor {
    store: Arc<dyn SharedStateStore>,
    queue: Arc<dyn DelayedQueue>,
    presence: Arc<PresenceTracker>,
    clock: Arc<dyn Clock>,
    config: LivenessConfig,
    shutdown_token: CancellationToken,
}

impl LivenessMonitor {
    pub fn new(
        store: Arc<dyn SharedStateStore>,
        queue: Arc<dyn DelayedQueue>,
        presence: Arc<PresenceTracker>,
        clock: Arc<dyn Clock>,
        config: LivenessConfig,
    ) -> Self {
        Self {
            store,
            queue,
            presence,
            clock,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Record a heartbeat and schedule its recheck after the check delay.
    pub async fn record_heartbeat(&self, connection_id: &Identity) -> Result<HeartbeatRecord, RelayError> {
        let now = self.clock.now_millis();
        let ttl = self.config.record_ttl();

        self.store
            .set_with_expiry(&heartbeat_key(connection_id), &now.to_string(), ttl)
            .await?;
        self.store
            .set_with_expiry(
                &client_status_key(connection_id),
                PresenceStatus::Online.as_str(),
                ttl,
            )
            .await?;

        let recheck = DelayedTask::Recheck(RecheckRequest {
            connection_id: connection_id.clone(),
            observed_at: now,
            attempt: 0,
        });
        // The record still expires on its own if the recheck is lost
        if let Err(e) = self.queue.schedule(recheck, self.config.check_delay()).await {
            warn!(connection_id = %connection_id, error = %e, "Failed to schedule heartbeat recheck");
        }

        debug!(connection_id = %connection_id, observed_at = now, "Heartbeat recorded");
        Ok(HeartbeatRecord {
            connection_id: connection_id.clone(),
            last_seen_at: now,
            expires_at: now + ttl.as_millis() as i64,
        })
    }

    /// Decide whether the connection that sent the heartbeat at `observed_at`
    /// has gone quiet. Safe to run more than once for the same request.
    pub async fn handle_deferred_recheck(
        &self,
        connection_id: &Identity,
        observed_at: i64,
    ) -> Result<RecheckOutcome, RelayError> {
        let now = self.clock.now_millis();
        let last_seen = self
            .store
            .get(&heartbeat_key(connection_id))
            .await?
            .and_then(|raw| raw.parse::<i64>().ok());

        let outcome = match last_seen {
            None => RecheckOutcome::TimedOut,
            Some(last) if last > observed_at => RecheckOutcome::Superseded,
            Some(last) if now - last > self.config.heartbeat_interval_ms as i64 => {
                RecheckOutcome::TimedOut
            }
            Some(_) => RecheckOutcome::Fresh,
        };

        match outcome {
            RecheckOutcome::TimedOut => {
                info!(connection_id = %connection_id, observed_at, "Heartbeat timed out");
                metrics::counter!("relay_heartbeat_timeouts_total").increment(1);
                self.store
                    .set_with_expiry(
                        &client_status_key(connection_id),
                        PresenceStatus::Offline.as_str(),
                        self.config.record_ttl(),
                    )
                    .await?;
                self.presence.mark_offline(connection_id).await?;
            }
            RecheckOutcome::Superseded => {
                debug!(connection_id = %connection_id, observed_at, "Recheck superseded by newer heartbeat");
            }
            RecheckOutcome::Fresh => {
                debug!(connection_id = %connection_id, observed_at, "Connection still alive");
            }
        }
        Ok(outcome)
    }

    /// Last status written for a single connection.
    pub async fn client_status(&self, connection_id: &Identity) -> Result<Option<PresenceStatus>, RelayError> {
        Ok(self
            .store
            .get(&client_status_key(connection_id))
            .await?
            .and_then(|raw| raw.parse::<PresenceStatus>().ok()))
    }

    async fn run_task(&self, task: &DelayedTask) -> Result<(), RelayError> {
        match task {
            DelayedTask::Recheck(req) => {
                self.handle_deferred_recheck(&req.connection_id, req.observed_at)
                    .await?;
            }
            DelayedTask::MarkOnline { identity, .. } => {
                self.presence.mark_online(identity).await?;
            }
        }
        Ok(())
    }

    /// Claim and run every due task, up to one batch. Returns how many were
    /// claimed.
    pub async fn process_due(&self) -> Result<usize, RelayError> {
        let tasks = self.queue.take_due(self.config.batch_size).await?;
        let claimed = tasks.len();

        for task in tasks {
            let Err(e) = self.run_task(&task).await else {
                continue;
            };
            if task.attempt() + 1 < MAX_TASK_ATTEMPTS {
                warn!(task = task.kind(), error = %e, "Delayed task failed, requeueing once");
                if let Err(requeue_err) = self
                    .queue
                    .schedule(task.next_attempt(), self.config.poll_interval())
                    .await
                {
                    error!(task = task.kind(), error = %requeue_err, "Failed to requeue delayed task");
                }
            } else {
                error!(task = task.kind(), error = %e, "Delayed task failed again, discarding");
                metrics::counter!("relay_delayed_tasks_discarded_total").increment(1);
            }
        }
        Ok(claimed)
    }

    /// Start the delayed task worker
    /// Returns a handle that can be used to await the task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            check_delay_ms = self.config.check_delay_ms,
            "Starting liveness worker"
        );

        let period = self.config.poll_interval().max(Duration::from_millis(1));
        let mut tick = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    // Drain backlog without waiting a full tick between batches
                    loop {
                        match self.process_due().await {
                            Ok(n) if n >= self.config.batch_size => continue,
                            Ok(_) => break,
                            Err(e) => {
                                warn!("Delayed queue poll failed: {}", e);
                                break;
                            }
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Liveness worker shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::identity_registry::IdentityRegistry;
    use crate::domain::clock::ManualClock;
    use crate::domain::node_config::PresenceConfig;
    use crate::domain::role::Role;
    use crate::infrastructure::memory::UnavailableStateStore;
    use crate::infrastructure::{InMemoryDelayedQueue, InMemoryMessageBus, InMemoryStateStore};

    struct Fixture {
        clock: Arc<ManualClock>,
        queue: Arc<InMemoryDelayedQueue>,
        registry: Arc<IdentityRegistry>,
        presence: Arc<PresenceTracker>,
        monitor: LivenessMonitor,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryStateStore::new(clock.clone()));
        let bus = Arc::new(InMemoryMessageBus::new(32));
        let queue = Arc::new(InMemoryDelayedQueue::new(clock.clone()));
        let registry = Arc::new(IdentityRegistry::new(store.clone(), bus.clone(), clock.clone()));
        let presence = Arc::new(PresenceTracker::new(
            store.clone(),
            bus,
            queue.clone(),
            registry.clone(),
            clock.clone(),
            PresenceConfig {
                ttl_secs: 300,
                online_delay_ms: 0,
            },
        ));
        let monitor = LivenessMonitor::new(
            store,
            queue.clone(),
            presence.clone(),
            clock.clone(),
            LivenessConfig::default(),
        );
        Fixture {
            clock,
            queue,
            registry,
            presence,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_heartbeat_schedules_recheck_after_check_delay() {
        let f = fixture();
        f.clock.set(5_000);
        let record = f.monitor.record_heartbeat(&"c1".into()).await.unwrap();
        assert_eq!(record.last_seen_at, 5_000);
        assert_eq!(record.expires_at, 125_000);
        assert_eq!(
            f.monitor.client_status(&"c1".into()).await.unwrap(),
            Some(PresenceStatus::Online)
        );

        f.clock.advance(59_999);
        assert!(f.queue.take_due(10).await.unwrap().is_empty());
        f.clock.advance(1);
        let due = f.queue.take_due(10).await.unwrap();
        assert_eq!(
            due,
            vec![DelayedTask::Recheck(RecheckRequest {
                connection_id: "c1".into(),
                observed_at: 5_000,
                attempt: 0,
            })]
        );
    }

    #[tokio::test]
    async fn test_stale_heartbeat_times_out_and_flips_role_offline() {
        let f = fixture();
        let id = f.registry.assign_identity(Role::A).await.unwrap();
        f.presence.mark_online(&id).await.unwrap();

        f.monitor.record_heartbeat(&id).await.unwrap();
        f.clock.advance(60_000);
        assert_eq!(f.monitor.process_due().await.unwrap(), 1);

        assert_eq!(
            f.monitor.client_status(&id).await.unwrap(),
            Some(PresenceStatus::Offline)
        );
        assert_eq!(
            f.presence.get_status(Role::A).await.unwrap(),
            Some(PresenceStatus::Offline)
        );
    }

    #[tokio::test]
    async fn test_newer_heartbeat_supersedes_recheck() {
        let f = fixture();
        f.monitor.record_heartbeat(&"c".into()).await.unwrap();
        f.clock.advance(30_000);
        f.monitor.record_heartbeat(&"c".into()).await.unwrap();
        f.clock.advance(30_000);

        let outcome = f.monitor.handle_deferred_recheck(&"c".into(), 0).await.unwrap();
        assert_eq!(outcome, RecheckOutcome::Superseded);
        assert_eq!(
            f.monitor.client_status(&"c".into()).await.unwrap(),
            Some(PresenceStatus::Online)
        );
    }

    #[tokio::test]
    async fn test_recent_heartbeat_is_fresh() {
        let f = fixture();
        f.monitor.record_heartbeat(&"c".into()).await.unwrap();
        f.clock.advance(30_000);
        let outcome = f.monitor.handle_deferred_recheck(&"c".into(), 0).await.unwrap();
        assert_eq!(outcome, RecheckOutcome::Fresh);
    }

    #[tokio::test]
    async fn test_missing_record_times_out() {
        let f = fixture();
        let outcome = f
            .monitor
            .handle_deferred_recheck(&"never-seen".into(), 0)
            .await
            .unwrap();
        assert_eq!(outcome, RecheckOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_recheck_is_idempotent() {
        let f = fixture();
        f.monitor.record_heartbeat(&"c".into()).await.unwrap();
        f.clock.advance(61_000);
        for _ in 0..2 {
            let outcome = f.monitor.handle_deferred_recheck(&"c".into(), 0).await.unwrap();
            assert_eq!(outcome, RecheckOutcome::TimedOut);
        }
    }

    #[tokio::test]
    async fn test_mark_online_task_runs_through_worker() {
        let f = fixture();
        let id = f.registry.assign_identity(Role::B).await.unwrap();
        f.presence.schedule_online(&id).await.unwrap();
        assert_eq!(f.monitor.process_due().await.unwrap(), 1);
        assert_eq!(
            f.presence.get_status(Role::B).await.unwrap(),
            Some(PresenceStatus::Online)
        );
    }

    #[tokio::test]
    async fn test_failing_task_is_requeued_once_then_discarded() {
        let f = fixture();
        let monitor = LivenessMonitor::new(
            Arc::new(UnavailableStateStore),
            f.queue.clone(),
            f.presence.clone(),
            f.clock.clone(),
            LivenessConfig::default(),
        );
        let task = DelayedTask::Recheck(RecheckRequest {
            connection_id: "c".into(),
            observed_at: 0,
            attempt: 0,
        });
        f.queue.schedule(task.clone(), Duration::ZERO).await.unwrap();

        assert_eq!(monitor.process_due().await.unwrap(), 1);
        assert_eq!(f.queue.pending().await.unwrap(), 1);
        assert!(f.queue.take_due(10).await.unwrap().is_empty());

        f.clock.advance(LivenessConfig::default().poll_interval_ms as i64);
        let retried = f.queue.take_due(10).await.unwrap();
        assert_eq!(retried, vec![task.next_attempt()]);
        assert_eq!(retried[0].attempt(), 1);

        f.queue.schedule(retried[0].clone(), Duration::ZERO).await.unwrap();
        assert_eq!(monitor.process_due().await.unwrap(), 1);
        assert_eq!(f.queue.pending().await.unwrap(), 0);

        f.clock.advance(60_000);
        assert_eq!(monitor.process_due().await.unwrap(), 0);
    }
}
