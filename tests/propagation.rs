//! Propagation Tests for Synced Cache
//!
//! Several "processes" share one in-memory bus and one persistent tier. Each
//! process has its own `SyncSubscriber` and local tier, exactly as separate
//! OS processes would against Redis.
//!
//! # Running
//! ```bash
//! cargo test --test propagation
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use synced_cache::protocol::decode;
use synced_cache::{
    CacheEntry, CacheOptions, ClearOptions, DeleteOptions, EntryOptions, InMemoryBus,
    InMemoryStore, LoadOutcome, LocalStore, MessageBus, SyncConfig, SyncEvent, SyncSubscriber,
    SyncedCache, Topics, WriteOptions,
};

// =============================================================================
// Helpers
// =============================================================================

struct Process {
    subscriber: Arc<SyncSubscriber>,
    local: Arc<InMemoryStore>,
    cache: Arc<SyncedCache>,
}

fn test_config() -> SyncConfig {
    SyncConfig {
        reconnect_delay_ms: 20,
        ready_timeout_ms: 2_000,
        ..Default::default()
    }
}

async fn spawn_process(bus: &Arc<InMemoryBus>, persistent: &Arc<InMemoryStore>, options: CacheOptions) -> Process {
    let subscriber = SyncSubscriber::new(bus.clone(), &test_config());
    subscriber.start(true).await.expect("subscriber ready");
    let local = Arc::new(InMemoryStore::new());
    let cache = SyncedCache::new(local.clone(), persistent.clone(), subscriber.clone(), options);
    Process { subscriber, local, cache }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

/// Give in-flight messages time to arrive before asserting absence.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn local_value(process: &Process, key: &str) -> Option<Vec<u8>> {
    process.local.read(key).await.unwrap().map(|e| e.value)
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Propagation
// =============================================================================

#[tokio::test]
async fn test_write_propagates_to_other_process() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    a.cache.write("user.1", "alice", &WriteOptions::default()).await.unwrap();

    eventually("b sees user.1", || async { b.cache.read("user.1").await.unwrap() == Some(b"alice".to_vec()) }).await;
    assert_eq!(persistent.read("user.1").await.unwrap().unwrap().value, b"alice");
}

#[tokio::test]
async fn test_write_carries_entry_options() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    let opts = WriteOptions::default().with_ttl(synced_cache::CacheTtl::Hour);
    a.cache.write("k", "v", &opts).await.unwrap();

    eventually("b has k", || async { b.local.read("k").await.unwrap().is_some() }).await;
    let entry = b.local.read("k").await.unwrap().unwrap();
    assert_eq!(entry.options.ttl, Some(synced_cache::CacheTtl::Hour));
}

#[tokio::test]
async fn test_instances_in_one_process_sync_each_other() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    let sibling_local = Arc::new(InMemoryStore::new());
    let sibling = SyncedCache::new(sibling_local.clone(), persistent.clone(), a.subscriber.clone(), CacheOptions::default());
    assert_eq!(a.subscriber.registered_count(), 2);

    a.cache.write("k", "v", &WriteOptions::default()).await.unwrap();
    eventually("sibling sees k", || async { sibling.read("k").await.unwrap().is_some() }).await;
}

// =============================================================================
// No feedback loop
// =============================================================================

#[tokio::test]
async fn test_no_feedback_loop() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    a.cache.write("k", "v1", &WriteOptions::default()).await.unwrap();
    eventually("b sees v1", || async { local_value(&b, "k").await == Some(b"v1".to_vec()) }).await;

    // Writer overwrites its own local copy silently; its echo must not restore v1
    a.local.write("k", &CacheEntry::new(b"local-only".to_vec(), EntryOptions::default())).await.unwrap();
    settle().await;

    assert_eq!(local_value(&a, "k").await, Some(b"local-only".to_vec()));
    // Only the original write was ever published: receivers never re-publish
    assert_eq!(bus.published_count(), 1);
}

// =============================================================================
// Silent fetch-through
// =============================================================================

#[tokio::test]
async fn test_fetch_from_persistent_is_not_broadcast() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    persistent.write("k", &CacheEntry::new(b"shared".to_vec(), EntryOptions::default())).await.unwrap();

    assert_eq!(b.cache.fetch("k", None).await.unwrap(), Some(b"shared".to_vec()));
    settle().await;

    assert_eq!(local_value(&b, "k").await, Some(b"shared".to_vec()));
    assert_eq!(local_value(&a, "k").await, None);
    assert_eq!(bus.published_count(), 0);
}

#[tokio::test]
async fn test_loaded_value_is_broadcast() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    let loader = |key: &str| LoadOutcome::found(format!("loaded {key}"));
    a.cache.fetch("k", Some(&loader)).await.unwrap();

    eventually("b sees loaded k", || async { local_value(&b, "k").await == Some(b"loaded k".to_vec()) }).await;
}

// =============================================================================
// Delete and clear
// =============================================================================

#[tokio::test]
async fn test_delete_propagates() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    a.cache.write("k", "v", &WriteOptions::default()).await.unwrap();
    eventually("b sees k", || async { local_value(&b, "k").await.is_some() }).await;

    assert!(a.cache.delete("k", &DeleteOptions::default()).await.unwrap());
    eventually("b lost k", || async { local_value(&b, "k").await.is_none() }).await;
    assert!(persistent.read("k").await.unwrap().is_none());
}

#[tokio::test]
async fn test_silent_delete_stays_local() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    a.cache.write("k", "v", &WriteOptions::default()).await.unwrap();
    eventually("b sees k", || async { local_value(&b, "k").await.is_some() }).await;

    a.cache.delete("k", &DeleteOptions::default().silent().local_only()).await.unwrap();
    settle().await;

    assert_eq!(local_value(&a, "k").await, None);
    assert_eq!(local_value(&b, "k").await, Some(b"v".to_vec()));
}

#[tokio::test]
async fn test_clear_propagates() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    for key in ["a", "b", "c"] {
        a.cache.write(key, "v", &WriteOptions::default()).await.unwrap();
    }
    eventually("b has 3 entries", || async { b.local.len() == 3 }).await;

    a.cache.clear(&ClearOptions::default()).await.unwrap();
    eventually("b cleared", || async { b.local.is_empty() }).await;
    assert!(persistent.is_empty());
}

#[tokio::test]
async fn test_clear_not_propagated_when_disabled() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let options = CacheOptions {
        propagate_clear: false,
        ..Default::default()
    };
    let a = spawn_process(&bus, &persistent, options).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    a.cache.write("k", "v", &WriteOptions::default()).await.unwrap();
    eventually("b sees k", || async { local_value(&b, "k").await.is_some() }).await;

    a.cache.clear(&ClearOptions::default().local_only()).await.unwrap();
    settle().await;
    assert!(a.local.is_empty());
    assert_eq!(b.local.len(), 1);
}

// =============================================================================
// force_miss isolation
// =============================================================================

#[tokio::test]
async fn test_force_miss_always_loads_and_stores_nothing() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default().with_force_miss(true)).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    let calls = AtomicUsize::new(0);
    let loader = |_: &str| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        LoadOutcome::found(format!("v{n}"))
    };

    assert_eq!(a.cache.fetch("k", Some(&loader)).await.unwrap(), Some(b"v1".to_vec()));
    assert_eq!(a.cache.fetch("k", Some(&loader)).await.unwrap(), Some(b"v2".to_vec()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    settle().await;
    assert!(a.local.is_empty());
    assert!(b.local.is_empty());
    assert!(persistent.is_empty());
    assert_eq!(bus.published_count(), 0);
}

// =============================================================================
// Batched fetch_multi
// =============================================================================

#[tokio::test]
async fn test_fetch_multi_broadcasts_one_batch() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    a.cache.write("k1", "stored", &WriteOptions::default()).await.unwrap();
    eventually("b sees k1", || async { local_value(&b, "k1").await.is_some() }).await;
    let published_before = bus.published_count();

    let calls = AtomicUsize::new(0);
    let loader = |key: &str| {
        calls.fetch_add(1, Ordering::SeqCst);
        LoadOutcome::found(format!("{key}-loaded"))
    };
    let results = a
        .cache
        .fetch_multi(&keys(&["k1", "k2", "k3", "k2"]), Some(&loader))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results["k1"], b"stored");
    assert_eq!(results["k2"], b"k2-loaded");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(bus.published_count(), published_before + 1);

    eventually("b sees k2 and k3", || async {
        local_value(&b, "k2").await.is_some() && local_value(&b, "k3").await.is_some()
    })
    .await;
}

#[tokio::test]
async fn test_fetch_multi_shares_loaded_keys_but_not_persisted_ones() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    persistent
        .write("k1", &CacheEntry::new(b"persisted".to_vec(), EntryOptions::default()))
        .await
        .unwrap();
    let topics = Topics::default();
    let mut tap = bus.subscribe(&topics.all()).await.unwrap();

    let calls = AtomicUsize::new(0);
    let loader = |key: &str| {
        calls.fetch_add(1, Ordering::SeqCst);
        LoadOutcome::found(format!("loader({key})"))
    };
    let results = a.cache.fetch_multi(&keys(&["k1", "k2"]), Some(&loader)).await.unwrap();

    let expected: HashMap<String, Vec<u8>> = HashMap::from([
        ("k1".to_string(), b"persisted".to_vec()),
        ("k2".to_string(), b"loader(k2)".to_vec()),
    ]);
    assert_eq!(results, expected);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.published_count(), 1);

    let message = tokio::time::timeout(Duration::from_secs(1), tap.next())
        .await
        .expect("batch published")
        .expect("bus open")
        .unwrap();
    match decode(&topics, &message.topic, &message.payload).unwrap() {
        SyncEvent::Write(records) => {
            let batch: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
            assert_eq!(batch, vec!["k2"]);
            assert_eq!(records[0].origin_id, a.cache.id());
        }
        other => panic!("expected a write batch, got {:?}", other.kind()),
    }

    eventually("b sees k2", || async { local_value(&b, "k2").await == Some(b"loader(k2)".to_vec()) }).await;
    settle().await;
    assert_eq!(local_value(&b, "k1").await, None);
    assert_eq!(a.local.len(), 2);
}

// =============================================================================
// Reconnect
// =============================================================================

#[tokio::test]
async fn test_propagation_resumes_after_reconnect() {
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());
    let a = spawn_process(&bus, &persistent, CacheOptions::default()).await;
    let b = spawn_process(&bus, &persistent, CacheOptions::default()).await;

    let mut states = b.subscriber.state_receiver();
    bus.sever();
    states
        .wait_for(|s| *s != synced_cache::SubscriberState::Subscribed)
        .await
        .unwrap();
    b.subscriber.wait_until_subscribed(Duration::from_secs(2)).await.unwrap();
    a.subscriber.wait_until_subscribed(Duration::from_secs(2)).await.unwrap();

    assert_eq!(b.subscriber.registered_count(), 1);
    a.cache.write("after", "v", &WriteOptions::default()).await.unwrap();
    eventually("b sees post-reconnect write", || async { local_value(&b, "after").await.is_some() }).await;
}
