// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Redis pub/sub bus.
//!
//! Publishing goes over the shared multiplexed connection. Each subscription
//! owns a dedicated pub/sub connection driven by a background task that
//! forwards messages into a bounded channel and reconnects with exponential
//! backoff when the server drops it. The task ends when the consumer drops
//! its stream.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::connection::RedisConnection;
use crate::domain::repository::{BusChannel, BusEnvelope, BusError, BusStream, MessageBus};

const SUBSCRIPTION_BUFFER: usize = 1024;
const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(100);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);

pub struct RedisMessageBus {
    conn: RedisConnection,
}

impl RedisMessageBus {
    pub fn new(conn: RedisConnection) -> Self {
        Self { conn }
    }

    fn channel_name(&self, channel: BusChannel) -> String {
        self.conn.key(channel.name())
    }

    async fn open_pubsub(conn: &RedisConnection) -> Result<redis::aio::PubSub, BusError> {
        let mut pubsub = conn
            .bounded(conn.client().get_async_pubsub())
            .await
            .map_err(BusError::Timeout)??;
        for channel in BusChannel::ALL {
            let name = conn.key(channel.name());
            conn.bounded(pubsub.subscribe(name))
                .await
                .map_err(BusError::Timeout)??;
        }
        Ok(pubsub)
    }
}

fn parse_message(conn: &RedisConnection, msg: &redis::Msg) -> Option<BusEnvelope> {
    let name = msg.get_channel_name();
    let prefix = conn.key("");
    let bare = name.strip_prefix(prefix.as_str()).unwrap_or(name);
    let channel = match bare.parse::<BusChannel>() {
        Ok(channel) => channel,
        Err(e) => {
            warn!(error = %e, "Ignoring message on unexpected channel");
            return None;
        }
    };
    match msg.get_payload::<String>() {
        Ok(payload) => Some(BusEnvelope { channel, payload }),
        Err(e) => {
            warn!(channel = %channel, error = %e, "Dropping non-text bus payload");
            None
        }
    }
}

/// Forward one pub/sub connection until it ends or the consumer goes away.
/// Returns false when the consumer is gone.
async fn pump(
    conn: &RedisConnection,
    pubsub: redis::aio::PubSub,
    tx: &mpsc::Sender<BusEnvelope>,
) -> bool {
    let messages = pubsub.into_on_message();
    tokio::pin!(messages);
    loop {
        tokio::select! {
            _ = tx.closed() => return false,
            next = messages.next() => match next {
                Some(msg) => {
                    if let Some(envelope) = parse_message(conn, &msg) {
                        if tx.send(envelope).await.is_err() {
                            return false;
                        }
                    }
                }
                None => {
                    warn!("Redis subscription stream ended");
                    return true;
                }
            },
        }
    }
}

async fn run_subscription(
    conn: RedisConnection,
    first: redis::aio::PubSub,
    tx: mpsc::Sender<BusEnvelope>,
) {
    let mut pubsub = Some(first);
    let mut delay = RECONNECT_BASE_DELAY;

    loop {
        if let Some(active) = pubsub.take() {
            if !pump(&conn, active, &tx).await {
                debug!("Bus subscriber dropped, stopping subscription task");
                return;
            }
            delay = RECONNECT_BASE_DELAY;
        }

        tokio::select! {
            _ = tx.closed() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        match RedisMessageBus::open_pubsub(&conn).await {
            Ok(fresh) => {
                info!("Redis bus subscription re-established");
                metrics::counter!("relay_bus_reconnects_total").increment(1);
                pubsub = Some(fresh);
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?delay, "Redis bus reconnect failed");
                delay = (delay * 2).min(RECONNECT_MAX_DELAY);
            }
        }
    }
}

#[async_trait]
impl MessageBus for RedisMessageBus {
    async fn publish(&self, channel: BusChannel, payload: String) -> Result<usize, BusError> {
        let mut con = self.conn.manager();
        let cmd = redis::cmd("PUBLISH")
            .arg(self.channel_name(channel))
            .arg(payload)
            .clone();
        let receivers: usize = self
            .conn
            .bounded(cmd.query_async(&mut con))
            .await
            .map_err(BusError::Timeout)??;
        Ok(receivers)
    }

    async fn subscribe(&self) -> Result<BusStream, BusError> {
        let pubsub = Self::open_pubsub(&self.conn).await?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(run_subscription(self.conn.clone(), pubsub, tx));
        info!("Subscribed to relay bus channels");
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
