//! Fetch-through: local tier, then persistent tier, then the loader.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::CacheError;
use crate::loader::Loader;
use crate::metrics::LatencyTimer;
use crate::protocol::SyncEvent;
use crate::storage::Fetched;

use super::SyncedCache;

impl SyncedCache {
    /// Return the value for `key`, loading it on a full miss.
    ///
    /// - Local hit: returned as-is.
    /// - Persistent hit: copied into the local tier silently. Other
    ///   instances can read it from the persistent tier themselves.
    /// - Loader `Found`: written to both tiers and broadcast.
    /// - Loader `Uncached`: returned, stored nowhere.
    ///
    /// Without a loader a full miss returns `None`. With `force_miss` the
    /// loader is always called and no tier is touched, so it is required.
    #[tracing::instrument(skip(self, loader), fields(origin_id = %self.id))]
    pub async fn fetch(&self, key: &str, loader: Option<&dyn Loader>) -> Result<Option<Vec<u8>>, CacheError> {
        let _timer = LatencyTimer::new("synced", "fetch");

        if self.options.force_miss {
            let loader = loader.ok_or(CacheError::MissingLoader { operation: "fetch" })?;
            let outcome = loader.load(key).await?;
            crate::metrics::record_loader_call("force_miss");
            return Ok(outcome.into_value());
        }

        if let Some(entry) = self.local.read(key).await.map_err(CacheError::local)? {
            crate::metrics::record_lookup(true);
            return Ok(Some(entry.value));
        }
        crate::metrics::record_lookup(false);

        let fetched = match loader {
            Some(loader) => self
                .persistent
                .fetch(key, loader, &self.options.default_entry)
                .await
                .map_err(CacheError::persistent)?,
            None => match self.persistent.read(key).await.map_err(CacheError::persistent)? {
                Some(entry) => Fetched::Stored(entry),
                None => Fetched::Missing,
            },
        };

        match fetched {
            Fetched::Stored(entry) => {
                self.fill_local(key, &entry).await;
                Ok(Some(entry.value))
            }
            Fetched::Loaded(entry) => {
                crate::metrics::record_loader_call("found");
                self.fill_local(key, &entry).await;
                let value = entry.value.clone();
                self.announce(SyncEvent::Write(vec![self.write_record(key, entry)])).await;
                Ok(Some(value))
            }
            Fetched::Uncached(value) => {
                crate::metrics::record_loader_call("uncached");
                Ok(Some(value))
            }
            Fetched::Missing => Ok(None),
        }
    }

    /// Batched [`fetch`](Self::fetch).
    ///
    /// One local `read_multi`, then one persistent `fetch_multi` for the keys
    /// still missing. Every value the loader produced is broadcast in a
    /// single multi-record write message. Keys with no value are absent
    /// from the result. A loader is always required.
    #[tracing::instrument(skip(self, keys, loader), fields(origin_id = %self.id, keys = keys.len()))]
    pub async fn fetch_multi(
        &self,
        keys: &[String],
        loader: Option<&dyn Loader>,
    ) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        let loader = loader.ok_or(CacheError::MissingLoader { operation: "fetch_multi" })?;
        let _timer = LatencyTimer::new("synced", "fetch_multi");

        if self.options.force_miss {
            let mut results = HashMap::with_capacity(keys.len());
            for key in unique(keys) {
                if let Some(value) = loader.load(&key).await?.into_value() {
                    results.insert(key, value);
                }
            }
            return Ok(results);
        }

        let mut results: HashMap<String, Vec<u8>> = self
            .local
            .read_multi(keys)
            .await
            .map_err(CacheError::local)?
            .into_iter()
            .map(|(key, entry)| (key, entry.value))
            .collect();

        let remaining: Vec<String> = unique(keys)
            .into_iter()
            .filter(|key| !results.contains_key(key))
            .collect();
        if remaining.is_empty() {
            return Ok(results);
        }

        let fetched = self
            .persistent
            .fetch_multi(&remaining, loader, &self.options.default_entry)
            .await
            .map_err(CacheError::persistent)?;

        let mut fill = Vec::new();
        let mut loaded = Vec::new();
        for (key, outcome) in fetched {
            if let Some(value) = outcome.value() {
                results.insert(key.clone(), value.to_vec());
            }
            match outcome {
                Fetched::Stored(entry) => fill.push((key, entry)),
                Fetched::Loaded(entry) => {
                    loaded.push(self.write_record(&key, entry.clone()));
                    fill.push((key, entry));
                }
                Fetched::Uncached(_) | Fetched::Missing => {}
            }
        }

        if !fill.is_empty() {
            if let Err(e) = self.local.write_multi(&fill).await {
                tracing::warn!(count = fill.len(), error = %e, "Failed to fill local tier");
                crate::metrics::record_error("local", "fill", "storage");
            }
        }
        debug!(
            local_hits = keys.len() - remaining.len(),
            filled = fill.len(),
            loaded = loaded.len(),
            "fetch_multi resolved"
        );
        if !loaded.is_empty() {
            self.announce(SyncEvent::Write(loaded)).await;
        }
        Ok(results)
    }
}

/// Keys in first-seen order, without duplicates.
fn unique(keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().filter(|key| seen.insert(key.as_str())).cloned().collect()
}
