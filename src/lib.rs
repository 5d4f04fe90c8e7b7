//! # Synced Cache
//!
//! A process-local cache kept consistent across processes that share a
//! slower persistent cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────── process A ────────────┐     ┌──────────── process B ────────────┐
//! │  SyncedCache ──► local tier       │     │  local tier ◄── SyncedCache        │
//! │      │                            │     │                      ▲             │
//! │      └──► SyncSubscriber.publish ─┼──┐  │  SyncSubscriber ─────┘ (apply)     │
//! └──────┬────────────────────────────┘  │  └───────────▲───────────────────────┘
//!        │                               ▼              │
//!        │                     ┌──────── bus ───────────┘
//!        │                     │  cache.writes / cache.deletes / cache.clears
//!        ▼                     └──────────────────────────
//! ┌───────────────── persistent tier (shared, authoritative) ─────────────────┐
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - Every mutation lands in the local tier, then the persistent tier, then
//!   goes out on the bus stamped with the instance's `origin_id`.
//! - One [`SyncSubscriber`] per process listens on the bus and applies each
//!   event to every registered instance except its origin.
//! - A fetch that misses locally but hits the persistent tier fills the local
//!   tier silently; only loader results and explicit writes are broadcast.
//!
//! Consistency is eventual: a lost message only costs a stale local entry
//! until it expires or is overwritten.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synced_cache::{
//!     CacheOptions, InMemoryStore, LoadOutcome, RedisBus, RedisStore, SyncConfig,
//!     SyncSubscriber, SyncedCache, WriteOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         redis_prefix: Some("myapp:".into()),
//!         channel_prefix: "myapp:".into(),
//!         ..Default::default()
//!     };
//!
//!     let bus = Arc::new(RedisBus::new("redis://localhost:6379").await?);
//!     let subscriber = SyncSubscriber::instance(bus, &config).await?;
//!     let persistent = Arc::new(RedisStore::from_config(&config).await?);
//!
//!     let cache = SyncedCache::new(
//!         Arc::new(InMemoryStore::new()),
//!         persistent,
//!         subscriber,
//!         CacheOptions::from(&config),
//!     );
//!
//!     cache.write("user.42", "alice", &WriteOptions::default()).await?;
//!
//!     let loader = |key: &str| LoadOutcome::found(format!("computed {key}"));
//!     let value = cache.fetch("user.7", Some(&loader)).await?;
//!     println!("{value:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`synced`]: The [`SyncedCache`] orchestrator
//! - [`subscriber`]: The per-process [`SyncSubscriber`]
//! - [`protocol`]: Topics and message encoding
//! - [`storage`]: Local and persistent tiers (memory, Redis)
//! - [`bus`]: Pub/sub transports (memory, Redis)
//! - [`resilience`]: Retry policies

pub mod bus;
pub mod compression;
pub mod config;
pub mod entry;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod options;
pub mod protocol;
pub mod resilience;
pub mod storage;
pub mod subscriber;
pub mod synced;

pub use bus::{BusError, BusMessage, BusSubscription, InMemoryBus, MessageBus, RedisBus};
pub use config::SyncConfig;
pub use entry::CacheEntry;
pub use error::CacheError;
pub use loader::{LoadError, LoadOutcome, Loader};
pub use options::{CacheOptions, CacheTtl, ClearOptions, DeleteOptions, EntryOptions, WriteOptions};
pub use protocol::{ClearEvent, DeleteEvent, EventKind, ProtocolError, SyncEvent, Topics, WriteEvent};
pub use resilience::retry::RetryConfig;
pub use storage::{Fetched, InMemoryStore, LocalStore, PersistentStore, RedisStore, StorageError};
pub use subscriber::{SubscriberError, SubscriberState, SyncSubscriber, SyncTarget};
pub use synced::SyncedCache;
pub use metrics::LatencyTimer;
