//! Two cache instances kept in sync over an in-process bus.
//!
//! Run with: `cargo run --example two_instances`
//! Set `RUST_LOG=synced_cache=debug` for the dispatch trace.

use std::sync::Arc;
use std::time::Duration;

use synced_cache::{
    CacheOptions, DeleteOptions, InMemoryBus, InMemoryStore, LoadOutcome, SyncConfig,
    SyncSubscriber, SyncedCache, WriteOptions,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synced_cache=info,two_instances=info".into()),
        )
        .init();

    let config = SyncConfig::default();
    let bus = Arc::new(InMemoryBus::new());
    let persistent = Arc::new(InMemoryStore::new());

    // One subscriber per simulated process
    let sub_a = SyncSubscriber::new(bus.clone(), &config);
    let sub_b = SyncSubscriber::new(bus.clone(), &config);
    sub_a.start(true).await?;
    sub_b.start(true).await?;

    let a = SyncedCache::new(Arc::new(InMemoryStore::new()), persistent.clone(), sub_a.clone(), CacheOptions::from(&config));
    let b = SyncedCache::new(Arc::new(InMemoryStore::new()), persistent.clone(), sub_b.clone(), CacheOptions::from(&config));

    a.write("greeting", "hello from a", &WriteOptions::default()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(value = ?b.read("greeting").await?.map(String::from_utf8), "b after a's write");

    let loader = |key: &str| LoadOutcome::found(format!("{key} computed by b"));
    b.fetch("report", Some(&loader)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(value = ?a.read("report").await?.map(String::from_utf8), "a after b's fetch");

    a.delete("greeting", &DeleteOptions::default()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(present = b.read("greeting").await?.is_some(), "b after a's delete");

    sub_a.shutdown().await;
    sub_b.shutdown().await;
    Ok(())
}
