// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - In-process Pub/Sub
//
// Implements the cluster MessageBus contract on top of a tokio broadcast
// channel. Every gateway sharing one InMemoryMessageBus behaves like a node
// of the same cluster, which is how single-node deployments and the
// multi-node tests run.
//
// Messages are lost on restart; lagging subscribers skip what they missed.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::domain::repository::{BusChannel, BusEnvelope, BusError, BusStream, MessageBus};

/// Message bus for publishing and subscribing within one process
#[derive(Clone)]
pub struct InMemoryMessageBus {
    sender: Arc<broadcast::Sender<BusEnvelope>>,
}

impl InMemoryMessageBus {
    /// Create a new bus with specified channel capacity
    /// Capacity determines how many messages can be buffered before slow
    /// subscribers start lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, channel: BusChannel, payload: String) -> Result<usize, BusError> {
        debug!(channel = %channel, "Publishing bus message");

        // send() only fails when nobody is listening, which is not an error here
        let receiver_count = self
            .sender
            .send(BusEnvelope { channel, payload })
            .unwrap_or(0);

        if receiver_count == 0 {
            debug!(channel = %channel, "No subscribers listening to bus message");
        }
        Ok(receiver_count)
    }

    async fn subscribe(&self) -> Result<BusStream, BusError> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|item| async move {
            match item {
                Ok(envelope) => Some(envelope),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!("Bus subscriber lagged by {} messages", n);
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = InMemoryMessageBus::new(10);
        let mut stream = bus.subscribe().await.unwrap();

        let delivered = bus
            .publish(BusChannel::Broadcast, "{\"content\":\"hi\"}".to_string())
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let envelope = stream.next().await.unwrap();
        assert_eq!(envelope.channel, BusChannel::Broadcast);
        assert_eq!(envelope.payload, "{\"content\":\"hi\"}");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_and_order() {
        let bus = InMemoryMessageBus::new(10);
        let mut first = bus.subscribe().await.unwrap();
        let mut second = bus.subscribe().await.unwrap();
        assert_eq!(bus.subscriber_count(), 2);

        for i in 0..3 {
            bus.publish(BusChannel::Targeted, i.to_string()).await.unwrap();
        }

        for stream in [&mut first, &mut second] {
            for i in 0..3 {
                assert_eq!(stream.next().await.unwrap().payload, i.to_string());
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryMessageBus::default();
        assert_eq!(
            bus.publish(BusChannel::Presence, "x".to_string()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let bus = InMemoryMessageBus::new(2);
        let mut stream = bus.subscribe().await.unwrap();
        for i in 0..5 {
            bus.publish(BusChannel::Broadcast, i.to_string()).await.unwrap();
        }
        // The two most recent survive
        assert_eq!(stream.next().await.unwrap().payload, "3");
        assert_eq!(stream.next().await.unwrap().payload, "4");
    }
}
