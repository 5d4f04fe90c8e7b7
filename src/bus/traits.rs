// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::pin::Pin;
use std::task::{Context, Poll};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};
use thiserror::Error;

/// Transport-level failure. The subscriber recovers from these on its own;
/// publishers log them.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("bus connection error: {0}")]
    Connection(String),
    #[error("bus subscription closed")]
    Closed,
    #[error("subscriber fell behind, {0} messages dropped")]
    Lagged(u64),
}

/// One message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// A live subscription: a stream of messages that ends (or yields an error)
/// when the underlying connection goes away.
pub struct BusSubscription {
    inner: BoxStream<'static, Result<BusMessage, BusError>>,
}

impl BusSubscription {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<BusMessage, BusError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Stop receiving. Dropping the subscription has the same effect.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Stream for BusSubscription {
    type Item = Result<BusMessage, BusError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubscription").finish_non_exhaustive()
    }
}

/// Publish/subscribe transport.
///
/// Delivery is at-least-once and unordered across publishers; the cache
/// never relies on more.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Subscribe to `topics`. The returned stream is the only reader of
    /// that subscription.
    async fn subscribe(&self, topics: &[String]) -> Result<BusSubscription, BusError>;
}
