//! Redis storage backend for the persistent tier.
//!
//! Every entry is stored as a Redis STRING holding the JSON form of its
//! [`CacheEntry`]:
//! ```json
//! {"value": "68656c6c6f", "options": {"ttl": "Minute", "compress": false}, "written_at": 1767084657058}
//! ```
//!
//! - Entries with a TTL are written with `SET .. EX`, so Redis expires them
//!   on the same schedule as the local tier.
//! - Entries hinted with `compress` are zstd-compressed above
//!   `compress_threshold` bytes; reads detect the magic bytes and
//!   decompress transparently.
//! - Keys are namespaced by an optional prefix; `clear()` only removes keys
//!   under that prefix (or flushes the database when there is none).

use std::collections::HashMap;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, AsyncCommands, pipe, cmd};
use tracing::debug;

use crate::compression::{decompress_bytes, maybe_compress};
use crate::entry::CacheEntry;
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{LocalStore, PersistentStore, StorageError};

const SCAN_COUNT: usize = 500;

pub struct RedisStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:user.alice")
    prefix: String,
    compress_threshold: usize,
}

impl RedisStore {
    /// Create a new Redis store without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a new Redis store with an optional key prefix.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use synced_cache::RedisStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be prefixed: "myapp:user.alice", "myapp:config.app"
    /// let store = RedisStore::with_prefix("redis://localhost", Some("myapp:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // Startup config: fast-fail instead of hanging forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            compress_threshold: 1024,
        })
    }

    /// Build from a [`SyncConfig`](crate::SyncConfig); requires `redis_url`.
    pub async fn from_config(config: &crate::SyncConfig) -> Result<Self, StorageError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| StorageError::Backend("redis_url is not configured".into()))?;
        let store = Self::with_prefix(url, config.redis_prefix.as_deref()).await?;
        Ok(store.with_compress_threshold(config.compress_threshold_bytes))
    }

    #[must_use]
    pub fn with_compress_threshold(mut self, bytes: usize) -> Self {
        self.compress_threshold = bytes;
        self
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn encode_entry(&self, entry: &CacheEntry) -> Result<Vec<u8>, StorageError> {
        let json = serde_json::to_vec(entry).map_err(|e| StorageError::Backend(e.to_string()))?;
        if entry.options.compress {
            maybe_compress(json, self.compress_threshold).map_err(|e| StorageError::Backend(e.to_string()))
        } else {
            Ok(json)
        }
    }

    fn decode_entry(key: &str, data: Vec<u8>) -> Result<Option<CacheEntry>, StorageError> {
        let corrupt = |reason: String| StorageError::Corruption {
            key: key.to_string(),
            reason,
        };
        let json = decompress_bytes(data).map_err(|e| corrupt(e.to_string()))?;
        let entry: CacheEntry = serde_json::from_slice(&json).map_err(|e| corrupt(e.to_string()))?;
        // Redis normally expires first; guard against clock skew between writers
        Ok((!entry.is_expired()).then_some(entry))
    }

    async fn delete_matching(&self, pattern: String) -> Result<u64, StorageError> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(format!("Failed to scan keys: {}", e)))?;

            if !keys.is_empty() {
                let removed: u64 = conn
                    .del(&keys)
                    .await
                    .map_err(|e| StorageError::Backend(format!("Failed to delete keys: {}", e)))?;
                deleted += removed;
            }
            if next == 0 {
                return Ok(deleted);
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl LocalStore for RedisStore {
    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        let data: Option<Vec<u8>> = retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let data: Option<Vec<u8>> = conn.get(&key).await?;
                Ok(data)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        match data {
            Some(bytes) => Self::decode_entry(key, bytes),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError> {
        if entry.is_expired() {
            self.delete(key).await?;
            return Ok(());
        }
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);
        let data = self.encode_entry(entry)?;
        let ttl = entry.remaining_ttl_secs();

        retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            let data = data.clone();
            async move {
                match ttl {
                    Some(secs) => {
                        let _: () = conn.set_ex(&key, data, secs).await?;
                    }
                    None => {
                        let _: () = conn.set(&key, data).await?;
                    }
                }
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_delete", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let removed: u64 = conn.del(&key).await?;
                Ok(removed > 0)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        if self.prefix.is_empty() {
            let mut conn = self.connection.clone();
            let _: () = cmd("FLUSHDB")
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            debug!("Flushed Redis database");
        } else {
            let deleted = self.delete_matching(format!("{}*", self.prefix)).await?;
            debug!(prefix = %self.prefix, deleted, "Cleared prefixed Redis keys");
        }
        Ok(())
    }

    /// One MGET round-trip for all keys.
    async fn read_multi(&self, keys: &[String]) -> Result<HashMap<String, CacheEntry>, StorageError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.connection.clone();
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();

        let values: Vec<Option<Vec<u8>>> = retry("redis_mget", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let prefixed = prefixed.clone();
            async move {
                let values: Vec<Option<Vec<u8>>> = cmd("MGET").arg(&prefixed).query_async(&mut conn).await?;
                Ok(values)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        let mut found = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            if let Some(bytes) = value {
                if let Some(entry) = Self::decode_entry(key, bytes)? {
                    found.insert(key.clone(), entry);
                }
            }
        }
        Ok(found)
    }

    /// Pipelined batch write (one round-trip, much faster than individual SETs).
    async fn write_multi(&self, entries: &[(String, CacheEntry)]) -> Result<usize, StorageError> {
        let mut prepared = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            if entry.is_expired() {
                continue;
            }
            prepared.push((self.prefixed_key(key), self.encode_entry(entry)?, entry.remaining_ttl_secs()));
        }
        if prepared.is_empty() {
            return Ok(0);
        }
        let count = prepared.len();
        let conn = self.connection.clone();

        retry("redis_write_batch", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let prepared = prepared.clone();
            async move {
                let mut pipeline = pipe();
                for (key, data, ttl) in &prepared {
                    match ttl {
                        Some(secs) => {
                            pipeline.set_ex(key, data.as_slice(), *secs);
                        }
                        None => {
                            pipeline.set(key, data.as_slice());
                        }
                    }
                }
                pipeline.query_async::<()>(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        Ok(count)
    }
}

impl PersistentStore for RedisStore {}
