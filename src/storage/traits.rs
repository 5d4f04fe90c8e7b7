// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use async_trait::async_trait;
use thiserror::Error;

use crate::entry::CacheEntry;
use crate::loader::{LoadError, LoadOutcome, Loader};
use crate::options::EntryOptions;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt entry for '{key}': {reason}")]
    Corruption { key: String, reason: String },
    #[error(transparent)]
    Loader(#[from] LoadError),
}

/// Where a persistent-tier fetch found its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// Already stored in the persistent tier
    Stored(CacheEntry),
    /// Produced by the loader and written back to the persistent tier
    Loaded(CacheEntry),
    /// Produced by the loader with "do not cache"; stored nowhere
    Uncached(Vec<u8>),
    /// Neither stored nor loadable
    Missing,
}

impl Fetched {
    /// The value handed back to the caller.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Fetched::Stored(entry) | Fetched::Loaded(entry) => Some(&entry.value),
            Fetched::Uncached(value) => Some(value),
            Fetched::Missing => None,
        }
    }
}

/// Capability set of the in-process tier.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, StorageError>;
    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError>;
    /// Returns whether the key was present.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
    async fn clear(&self) -> Result<(), StorageError>;

    /// Read several keys; missing keys are absent from the result.
    /// Default implementation falls back to sequential reads.
    async fn read_multi(&self, keys: &[String]) -> Result<HashMap<String, CacheEntry>, StorageError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.read(key).await? {
                found.insert(key.clone(), entry);
            }
        }
        Ok(found)
    }

    /// Write several entries (pipelined where the backend supports it).
    /// Default implementation falls back to sequential writes.
    async fn write_multi(&self, entries: &[(String, CacheEntry)]) -> Result<usize, StorageError> {
        for (key, entry) in entries {
            self.write(key, entry).await?;
        }
        Ok(entries.len())
    }
}

/// Capability set of the shared tier: the local set plus fetch-with-loader.
///
/// The default `fetch`/`fetch_multi` call the loader exactly once per key
/// that is genuinely missing and write `Found` values back before returning.
#[async_trait]
pub trait PersistentStore: LocalStore {
    async fn fetch(
        &self,
        key: &str,
        loader: &dyn Loader,
        defaults: &EntryOptions,
    ) -> Result<Fetched, StorageError> {
        if let Some(entry) = self.read(key).await? {
            return Ok(Fetched::Stored(entry));
        }
        match loader.load(key).await? {
            LoadOutcome::Found(value) => {
                let entry = CacheEntry::new(value, defaults.clone());
                self.write(key, &entry).await?;
                Ok(Fetched::Loaded(entry))
            }
            LoadOutcome::Uncached(value) => Ok(Fetched::Uncached(value)),
            LoadOutcome::NotFound => Ok(Fetched::Missing),
        }
    }

    async fn fetch_multi(
        &self,
        keys: &[String],
        loader: &dyn Loader,
        defaults: &EntryOptions,
    ) -> Result<HashMap<String, Fetched>, StorageError> {
        let stored = self.read_multi(keys).await?;
        let mut results = HashMap::with_capacity(keys.len());
        let mut to_write = Vec::new();

        for key in keys {
            if results.contains_key(key) {
                continue;
            }
            if let Some(entry) = stored.get(key) {
                results.insert(key.clone(), Fetched::Stored(entry.clone()));
                continue;
            }
            let fetched = match loader.load(key).await? {
                LoadOutcome::Found(value) => {
                    let entry = CacheEntry::new(value, defaults.clone());
                    to_write.push((key.clone(), entry.clone()));
                    Fetched::Loaded(entry)
                }
                LoadOutcome::Uncached(value) => Fetched::Uncached(value),
                LoadOutcome::NotFound => Fetched::Missing,
            };
            results.insert(key.clone(), fetched);
        }

        if !to_write.is_empty() {
            self.write_multi(&to_write).await?;
        }
        Ok(results)
    }
}
