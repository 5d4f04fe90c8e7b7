// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide receiver of cache synchronization events.
//!
//! One [`SyncSubscriber`] per process holds the bus subscription, the
//! registry of live cache instances and the publish lock. Every event
//! received is decoded once and applied to each registered instance except
//! the one that produced it.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized → Connecting → Subscribed ⇄ Disconnected → Connecting …
//!                                   └────────→ Stopped (shutdown)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synced_cache::{InMemoryBus, SyncConfig, SyncSubscriber, SubscriberState};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = Arc::new(InMemoryBus::new());
//! let subscriber = SyncSubscriber::new(bus, &SyncConfig::default());
//! assert_eq!(subscriber.state(), SubscriberState::Uninitialized);
//!
//! subscriber.start(true).await.expect("bus reachable");
//! assert!(subscriber.is_subscribed());
//! # }
//! ```

mod lifecycle;
mod types;

pub use types::{SubscriberError, SubscriberState, SyncTarget};

use std::sync::{Arc, Weak};
use std::time::Duration;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::MessageBus;
use crate::config::SyncConfig;
use crate::protocol::{SyncEvent, Topics};

static INSTANCE: OnceCell<Arc<SyncSubscriber>> = OnceCell::const_new();

pub struct SyncSubscriber {
    pub(super) bus: Arc<dyn MessageBus>,
    pub(super) topics: Topics,
    pub(super) reconnect_delay: Duration,
    pub(super) ready_timeout: Duration,

    /// Live cache instances. Weak so dropping a cache unregisters it.
    pub(super) registry: RwLock<Vec<Weak<dyn SyncTarget>>>,

    /// Serializes publishes from this process
    pub(super) publish_lock: tokio::sync::Mutex<()>,

    pub(super) state: watch::Sender<SubscriberState>,
    pub(super) state_rx: watch::Receiver<SubscriberState>,

    pub(super) shutdown: watch::Sender<bool>,
    pub(super) task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncSubscriber {
    /// Create a subscriber on `bus`. Nothing connects until [`start`](Self::start).
    pub fn new(bus: Arc<dyn MessageBus>, config: &SyncConfig) -> Arc<Self> {
        let (state, state_rx) = watch::channel(SubscriberState::Uninitialized);
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            bus,
            topics: Topics::new(&config.channel_prefix),
            reconnect_delay: config.reconnect_delay(),
            ready_timeout: config.ready_timeout(),
            registry: RwLock::new(Vec::new()),
            publish_lock: tokio::sync::Mutex::new(()),
            state,
            state_rx,
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// The process-wide subscriber, created and started on first use.
    ///
    /// Later calls return the same object and ignore their arguments. The
    /// listening task lives on the runtime that made the first call.
    pub async fn instance(bus: Arc<dyn MessageBus>, config: &SyncConfig) -> Result<Arc<Self>, SubscriberError> {
        let subscriber = INSTANCE
            .get_or_init(|| async { Self::new(bus, config) })
            .await
            .clone();
        subscriber.start(true).await?;
        Ok(subscriber)
    }

    /// The process-wide subscriber if [`instance`](Self::instance) has created it.
    pub fn global() -> Option<Arc<Self>> {
        INSTANCE.get().cloned()
    }

    /// Register a cache instance. Registering the same `origin_id` twice is a no-op.
    ///
    /// Returns whether the target was newly added.
    pub fn register(&self, target: &Arc<dyn SyncTarget>) -> bool {
        let origin_id = target.origin_id();
        let mut registry = self.registry.write();
        registry.retain(|weak| weak.strong_count() > 0);

        let exists = registry
            .iter()
            .filter_map(Weak::upgrade)
            .any(|t| t.origin_id() == origin_id);
        if !exists {
            registry.push(Arc::downgrade(target));
            debug!(origin_id, "Registered cache instance");
        }
        crate::metrics::set_registered_instances(registry.len());
        !exists
    }

    /// Number of live registered instances.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registry.read().iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Forget every registered instance. The subscription stays up.
    pub fn reset(&self) {
        self.registry.write().clear();
        crate::metrics::set_registered_instances(0);
        debug!("Subscriber registry reset");
    }

    /// Snapshot of live targets; prunes dead entries as a side effect.
    pub(super) fn live_targets(&self) -> Vec<Arc<dyn SyncTarget>> {
        let (live, dead) = {
            let registry = self.registry.read();
            let live: Vec<_> = registry.iter().filter_map(Weak::upgrade).collect();
            let dead = registry.len() - live.len();
            (live, dead)
        };
        if dead > 0 {
            let mut registry = self.registry.write();
            registry.retain(|weak| weak.strong_count() > 0);
            crate::metrics::set_registered_instances(registry.len());
            debug!(pruned = dead, "Pruned dropped cache instances");
        }
        live
    }

    /// Encode and publish `event`, serialized with every other publish
    /// from this process.
    #[tracing::instrument(skip(self, event), fields(kind = %event.kind(), records = event.len()))]
    pub async fn publish(&self, event: &SyncEvent) -> Result<(), SubscriberError> {
        if event.is_empty() {
            return Ok(());
        }
        let kind = event.kind();
        let payload = event.encode()?;
        let topic = self.topics.for_kind(kind);

        let result = {
            let _guard = self.publish_lock.lock().await;
            self.bus.publish(topic, &payload).await
        };
        match result {
            Ok(()) => {
                crate::metrics::record_publish(kind.as_str(), "success");
                Ok(())
            }
            Err(e) => {
                warn!(topic, error = %e, "Failed to publish sync event");
                crate::metrics::record_publish(kind.as_str(), "error");
                Err(e.into())
            }
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    #[must_use]
    pub fn state(&self) -> SubscriberState {
        *self.state_rx.borrow()
    }

    /// Receiver for watching state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SubscriberState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state() == SubscriberState::Subscribed
    }

    pub(super) fn set_state(&self, state: SubscriberState) {
        let _ = self.state.send(state);
        crate::metrics::set_subscriber_state(&state.to_string());
    }
}

impl std::fmt::Debug for SyncSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSubscriber")
            .field("topics", &self.topics)
            .field("state", &self.state())
            .field("registered", &self.registered_count())
            .finish_non_exhaustive()
    }
}
