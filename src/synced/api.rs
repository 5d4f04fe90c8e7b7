//! Write, read, delete and clear.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::metrics::LatencyTimer;
use crate::options::{ClearOptions, DeleteOptions, WriteOptions};
use crate::protocol::{ClearEvent, DeleteEvent, SyncEvent};

use super::SyncedCache;

impl SyncedCache {
    /// Store `value` under `key`.
    ///
    /// Writes the local tier, then the persistent tier (unless
    /// `opts.persist` is off), then broadcasts (unless `opts.silent`). A
    /// persistent failure returns [`CacheError::Persistent`] and skips the
    /// broadcast; the local write stays.
    #[tracing::instrument(skip(self, value, opts), fields(origin_id = %self.id))]
    pub async fn write(&self, key: &str, value: impl Into<Vec<u8>>, opts: &WriteOptions) -> Result<(), CacheError> {
        let _timer = LatencyTimer::new("synced", "write");
        let entry_options = opts.entry.clone().unwrap_or_else(|| self.options.default_entry.clone());
        let entry = CacheEntry::new(value.into(), entry_options);

        self.local.write(key, &entry).await.map_err(CacheError::local)?;

        if opts.persist {
            if let Err(e) = self.persistent.write(key, &entry).await {
                warn!(key, error = %e, "Persistent write failed; not broadcasting");
                crate::metrics::record_operation("persistent", "write", "error");
                return Err(CacheError::persistent(e));
            }
            crate::metrics::record_operation("persistent", "write", "success");
        }

        if !opts.silent {
            self.announce(SyncEvent::Write(vec![self.write_record(key, entry)])).await;
        }
        crate::metrics::record_operation("local", "write", "success");
        Ok(())
    }

    /// Local lookup. Expired entries read as misses.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entry = self.local.read(key).await.map_err(CacheError::local)?;
        crate::metrics::record_lookup(entry.is_some());
        Ok(entry.map(|e| e.value))
    }

    /// Local lookup of several keys; misses are absent from the result.
    pub async fn read_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        let found = self.local.read_multi(keys).await.map_err(CacheError::local)?;
        Ok(found.into_iter().map(|(key, entry)| (key, entry.value)).collect())
    }

    /// Remove `key`. Returns whether any tier touched held it.
    #[tracing::instrument(skip(self, opts), fields(origin_id = %self.id))]
    pub async fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<bool, CacheError> {
        let _timer = LatencyTimer::new("synced", "delete");
        let mut existed = self.local.delete(key).await.map_err(CacheError::local)?;

        if opts.persist {
            match self.persistent.delete(key).await {
                Ok(found) => existed |= found,
                Err(e) => {
                    warn!(key, error = %e, "Persistent delete failed; not broadcasting");
                    crate::metrics::record_operation("persistent", "delete", "error");
                    return Err(CacheError::persistent(e));
                }
            }
        }

        if !opts.silent {
            self.announce(SyncEvent::Delete(DeleteEvent {
                origin_id: self.id.clone(),
                key: key.to_string(),
            }))
            .await;
        }
        Ok(existed)
    }

    /// Empty the local tier (and the persistent tier unless `opts.persist`
    /// is off). Broadcast unless silent or `propagate_clear` is disabled.
    #[tracing::instrument(skip(self, opts), fields(origin_id = %self.id))]
    pub async fn clear(&self, opts: &ClearOptions) -> Result<(), CacheError> {
        self.local.clear().await.map_err(CacheError::local)?;

        if opts.persist {
            if let Err(e) = self.persistent.clear().await {
                warn!(error = %e, "Persistent clear failed; not broadcasting");
                crate::metrics::record_operation("persistent", "clear", "error");
                return Err(CacheError::persistent(e));
            }
        }

        if opts.silent || !self.options.propagate_clear {
            debug!("Clear kept local");
            return Ok(());
        }
        self.announce(SyncEvent::Clear(ClearEvent {
            origin_id: self.id.clone(),
        }))
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::options::{CacheOptions, CacheTtl, DeleteOptions, WriteOptions};
    use crate::storage::LocalStore;
    use super::super::test_support::harness;

    #[tokio::test]
    async fn test_write_reaches_both_tiers_and_publishes() {
        let h = harness(CacheOptions::default());
        h.cache.write("k", "v", &WriteOptions::default()).await.unwrap();

        assert_eq!(h.local.read("k").await.unwrap().unwrap().value, b"v");
        assert_eq!(h.persistent.read("k").await.unwrap().unwrap().value, b"v");
        assert_eq!(h.bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_write_local_only_and_silent() {
        let h = harness(CacheOptions::default());
        h.cache.write("k", "v", &WriteOptions::default().local_only().silent()).await.unwrap();

        assert_eq!(h.cache.read("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(h.persistent.is_empty());
        assert_eq!(h.bus.published_count(), 0);
    }

    #[tokio::test]
    async fn test_unsynced_cache_never_publishes() {
        let h = harness(CacheOptions::unsynced());
        h.cache.write("k", "v", &WriteOptions::default()).await.unwrap();
        h.cache.delete("k", &DeleteOptions::default()).await.unwrap();

        assert_eq!(h.bus.published_count(), 0);
    }

    #[tokio::test]
    async fn test_write_applies_entry_options() {
        let h = harness(CacheOptions::default());
        h.cache.write("k", "v", &WriteOptions::default().with_ttl(CacheTtl::Hour)).await.unwrap();

        let stored = h.persistent.read("k").await.unwrap().unwrap();
        assert_eq!(stored.options.ttl, Some(CacheTtl::Hour));
    }

    #[tokio::test]
    async fn test_write_with_huge_ttl_stays_readable() {
        let h = harness(CacheOptions::default());
        let opts = WriteOptions::default().with_ttl(CacheTtl::Custom(u64::MAX));
        h.cache.write("k", "v", &opts).await.unwrap();

        assert_eq!(h.cache.read("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(h.persistent.read("k").await.unwrap().is_some());
        assert_eq!(h.bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_read_multi_returns_local_hits_only() {
        let h = harness(CacheOptions::default());
        h.cache.write("a", "1", &WriteOptions::default()).await.unwrap();
        h.cache.write("b", "2", &WriteOptions::default().local_only()).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = h.cache.read_multi(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], b"2");
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let h = harness(CacheOptions::default());
        h.cache.write("k", "v", &WriteOptions::default()).await.unwrap();

        assert!(h.cache.delete("k", &DeleteOptions::default()).await.unwrap());
        assert!(!h.cache.delete("k", &DeleteOptions::default()).await.unwrap());
        assert!(h.persistent.is_empty());
        // write + two deletes
        assert_eq!(h.bus.published_count(), 3);
    }

    #[tokio::test]
    async fn test_clear_respects_propagate_clear() {
        let options = CacheOptions {
            propagate_clear: false,
            ..Default::default()
        };
        let h = harness(options);
        h.cache.write("k", "v", &WriteOptions::default().silent()).await.unwrap();

        h.cache.clear(&Default::default()).await.unwrap();
        assert!(h.local.is_empty());
        assert!(h.persistent.is_empty());
        assert_eq!(h.bus.published_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_local_only_keeps_persistent() {
        let h = harness(CacheOptions::default());
        h.cache.write("k", "v", &WriteOptions::default().silent()).await.unwrap();

        h.cache.clear(&DeleteOptions::default().local_only()).await.unwrap();
        assert!(h.local.is_empty());
        assert_eq!(h.persistent.len(), 1);
        assert_eq!(h.bus.published_count(), 1);
    }
}
