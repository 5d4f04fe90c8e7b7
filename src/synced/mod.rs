// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The synced cache.
//!
//! A [`SyncedCache`] pairs a local tier with a persistent tier shared by
//! every process, and broadcasts its mutations through the process's
//! [`SyncSubscriber`] so other instances update their local tiers.
//!
//! # Write path
//!
//! ```text
//! write(k, v) → local tier → persistent tier → publish Write{origin, k, v}
//!                                  │
//!                                  └─ failure: error returned, nothing published
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synced_cache::{
//!     CacheOptions, InMemoryBus, InMemoryStore, LoadOutcome, SyncConfig, SyncSubscriber,
//!     SyncedCache, WriteOptions,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let subscriber = SyncSubscriber::new(Arc::new(InMemoryBus::new()), &SyncConfig::default());
//! subscriber.start(true).await?;
//!
//! let shared = Arc::new(InMemoryStore::new());
//! let cache = SyncedCache::new(Arc::new(InMemoryStore::new()), shared, subscriber, CacheOptions::default());
//!
//! cache.write("user.42", "alice", &WriteOptions::default()).await?;
//! assert_eq!(cache.read("user.42").await?, Some(b"alice".to_vec()));
//!
//! let loader = |key: &str| LoadOutcome::found(format!("{key} from db"));
//! let value = cache.fetch("user.7", Some(&loader)).await?;
//! assert_eq!(value, Some(b"user.7 from db".to_vec()));
//! # Ok(())
//! # }
//! ```

mod api;
mod fetch;

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entry::CacheEntry;
use crate::options::CacheOptions;
use crate::protocol::{SyncEvent, WriteEvent};
use crate::storage::{LocalStore, PersistentStore, StorageError};
use crate::subscriber::{SyncSubscriber, SyncTarget};

/// A process-local cache kept consistent with its peers.
///
/// Cheap to share: hold it in an `Arc`. Dropping the last `Arc` removes the
/// instance from the subscriber's registry.
pub struct SyncedCache {
    id: String,
    local: Arc<dyn LocalStore>,
    persistent: Arc<dyn PersistentStore>,
    subscriber: Arc<SyncSubscriber>,
    options: CacheOptions,
}

impl SyncedCache {
    /// Build a cache and, when `options.sync` is set, register it with
    /// `subscriber`.
    pub fn new(
        local: Arc<dyn LocalStore>,
        persistent: Arc<dyn PersistentStore>,
        subscriber: Arc<SyncSubscriber>,
        options: CacheOptions,
    ) -> Arc<Self> {
        let cache = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            local,
            persistent,
            subscriber,
            options,
        });
        if cache.options.sync {
            let target: Arc<dyn SyncTarget> = cache.clone();
            cache.subscriber.register(&target);
        }
        info!(
            origin_id = %cache.id,
            sync = cache.options.sync,
            force_miss = cache.options.force_miss,
            "Synced cache created"
        );
        cache
    }

    /// Instance identity stamped on every event this cache publishes.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.options.sync
    }

    pub fn subscriber(&self) -> &Arc<SyncSubscriber> {
        &self.subscriber
    }

    fn write_record(&self, key: &str, entry: CacheEntry) -> WriteEvent {
        WriteEvent {
            origin_id: self.id.clone(),
            key: key.to_string(),
            entry,
        }
    }

    /// Publish unless sync is off. Failures are logged by the subscriber
    /// and swallowed here.
    async fn announce(&self, event: SyncEvent) {
        if !self.options.sync {
            return;
        }
        if let Err(e) = self.subscriber.publish(&event).await {
            debug!(origin_id = %self.id, kind = %event.kind(), error = %e, "Broadcast skipped");
        }
    }

    /// Copy an entry into the local tier without broadcasting. A failure
    /// only costs a future local miss.
    async fn fill_local(&self, key: &str, entry: &CacheEntry) {
        if let Err(e) = self.local.write(key, entry).await {
            warn!(key, error = %e, "Failed to fill local tier");
            crate::metrics::record_error("local", "fill", "storage");
        }
    }
}

#[async_trait]
impl SyncTarget for SyncedCache {
    fn origin_id(&self) -> &str {
        &self.id
    }

    async fn apply_remote_write(&self, key: &str, entry: CacheEntry) -> Result<(), StorageError> {
        if entry.is_expired() {
            debug!(key, "Ignoring expired remote write");
            return Ok(());
        }
        self.local.write(key, &entry).await
    }

    async fn apply_remote_delete(&self, key: &str) -> Result<(), StorageError> {
        self.local.delete(key).await.map(|_| ())
    }

    async fn apply_remote_clear(&self) -> Result<(), StorageError> {
        self.local.clear().await
    }
}

impl std::fmt::Debug for SyncedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedCache")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
