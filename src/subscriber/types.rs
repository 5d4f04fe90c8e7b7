//! Public types for the sync subscriber.

use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;

use crate::bus::BusError;
use crate::entry::CacheEntry;
use crate::protocol::ProtocolError;
use crate::storage::StorageError;

/// Subscriber lifecycle state.
///
/// Use [`super::SyncSubscriber::state()`] to check the current state or
/// [`super::SyncSubscriber::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Just created, loop not started
    Uninitialized,
    /// Subscribing to the bus (first time or after a disconnect)
    Connecting,
    /// Listening; remote events are being applied
    Subscribed,
    /// Connection lost, waiting out the reconnect delay
    Disconnected,
    /// Shut down explicitly; will not reconnect
    Stopped,
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Subscribed => write!(f, "Subscribed"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("subscriber not ready after {0:?}")]
    Timeout(Duration),
    #[error("publish failed: {0}")]
    Publish(#[from] BusError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("subscriber has been shut down")]
    Stopped,
}

/// A cache instance that receives remote events.
///
/// Implementations apply events to their local tier only: never to the
/// persistent tier and never re-published.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Identity stamped on everything this instance publishes.
    fn origin_id(&self) -> &str;

    async fn apply_remote_write(&self, key: &str, entry: CacheEntry) -> Result<(), StorageError>;

    async fn apply_remote_delete(&self, key: &str) -> Result<(), StorageError>;

    async fn apply_remote_clear(&self) -> Result<(), StorageError>;
}
