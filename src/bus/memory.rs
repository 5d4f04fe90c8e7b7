// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process bus on a tokio broadcast channel.
//!
//! Every `SyncSubscriber` that shares one `InMemoryBus` behaves like a
//! separate process subscribed to the same Redis channels, which makes the
//! bus handy for tests and single-binary deployments. [`InMemoryBus::sever`]
//! and [`InMemoryBus::set_offline`] inject connection failures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::traits::{BusError, BusMessage, BusSubscription, MessageBus};

const DEFAULT_CAPACITY: usize = 1024;

pub struct InMemoryBus {
    sender: Mutex<broadcast::Sender<BusMessage>>,
    capacity: usize,
    offline: AtomicBool,
    published: AtomicU64,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` is how many messages a slow subscriber may fall behind
    /// before it sees [`BusError::Lagged`].
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Mutex::new(sender),
            capacity,
            offline: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    /// Drop every live subscription, as if the connection broke.
    /// Their streams end once buffered messages are drained.
    pub fn sever(&self) {
        let (sender, _) = broadcast::channel(self.capacity);
        *self.sender.lock() = sender;
        debug!("In-memory bus severed all subscriptions");
    }

    /// While offline, publish and subscribe fail with [`BusError::Connection`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if offline {
            self.sever();
        }
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.lock().receiver_count()
    }

    /// Messages accepted by `publish` so far.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), BusError> {
        if self.is_offline() {
            Err(BusError::Connection("in-memory bus is offline".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.check_online()?;
        let sender = self.sender.lock().clone();
        // No receivers is not an error: like PUBLISH, nobody may be listening
        let _ = sender.send(BusMessage::new(topic, payload.to_vec()));
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<BusSubscription, BusError> {
        self.check_online()?;
        let receiver = self.sender.lock().subscribe();
        let topics: HashSet<String> = topics.iter().cloned().collect();

        let stream = futures::stream::unfold((receiver, topics), |(mut receiver, topics)| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) if topics.contains(&message.topic) => {
                        return Some((Ok(message), (receiver, topics)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        return Some((Err(BusError::Lagged(n)), (receiver, topics)));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(BusSubscription::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use futures::StreamExt;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(&topics(&["a"])).await.unwrap();

        bus.publish("b", b"ignored").await.unwrap();
        bus.publish("a", b"hello").await.unwrap();

        let message = sub.next().await.unwrap().unwrap();
        assert_eq!(message, BusMessage::new("a", b"hello".to_vec()));
        assert_eq!(bus.published_count(), 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryBus::new();
        assert!(bus.publish("a", b"x").await.is_ok());
    }

    #[tokio::test]
    async fn test_sever_ends_stream() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(&topics(&["a"])).await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        bus.sever();

        let next = tokio::time::timeout(Duration::from_secs(1), sub.next()).await.unwrap();
        assert!(next.is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_rejects_calls() {
        let bus = InMemoryBus::new();
        bus.set_offline(true);

        assert!(matches!(bus.publish("a", b"x").await, Err(BusError::Connection(_))));
        assert!(matches!(bus.subscribe(&topics(&["a"])).await, Err(BusError::Connection(_))));

        bus.set_offline(false);
        assert!(bus.subscribe(&topics(&["a"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_sees_error() {
        let bus = InMemoryBus::with_capacity(2);
        let mut sub = bus.subscribe(&topics(&["a"])).await.unwrap();
        for i in 0..5u8 {
            bus.publish("a", &[i]).await.unwrap();
        }

        assert!(matches!(sub.next().await, Some(Err(BusError::Lagged(_)))));
        // The stream keeps going after a lag
        assert!(matches!(sub.next().await, Some(Ok(_))));
    }
}
