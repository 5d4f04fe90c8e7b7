// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::entry::{now_millis, CacheEntry};
use super::traits::{LocalStore, PersistentStore, StorageError};

/// DashMap-backed tier with lazy expiry.
///
/// Used as the local tier of a [`SyncedCache`](crate::SyncedCache); a shared
/// `Arc<InMemoryStore>` also works as a persistent tier for single-host
/// setups and tests.
pub struct InMemoryStore {
    data: DashMap<String, CacheEntry>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current entry count (expired entries included until touched)
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_millis();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired_at(now));
        before - self.data.len()
    }

    /// Approximate bytes held.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.iter().map(|r| r.key().len() + r.value().size_bytes()).sum()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for InMemoryStore {
    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let entry = match self.data.get(key) {
            Some(r) => r.value().clone(),
            None => return Ok(None),
        };
        if entry.is_expired() {
            self.data.remove_if(key, |_, e| e.is_expired());
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }
}

impl PersistentStore for InMemoryStore {}
