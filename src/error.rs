// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::loader::LoadError;
use crate::storage::StorageError;

/// Errors surfaced by [`SyncedCache`](crate::SyncedCache) operations.
///
/// Bus failures never appear here: a publish that fails is logged and
/// counted, and the persistent tier stays authoritative.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("local tier error: {0}")]
    Local(#[source] StorageError),

    /// The persistent write/delete/clear failed. The local tier was already
    /// updated and nothing was broadcast.
    #[error("persistent tier error: {0}")]
    Persistent(#[source] StorageError),

    #[error(transparent)]
    Loader(#[from] LoadError),

    /// A loader is required for this call (`fetch_multi`, or `fetch` with
    /// `force_miss`).
    #[error("{operation} requires a loader")]
    MissingLoader { operation: &'static str },
}

impl CacheError {
    /// Map a persistent-tier error, keeping loader failures distinct.
    pub(crate) fn persistent(err: StorageError) -> Self {
        match err {
            StorageError::Loader(e) => CacheError::Loader(e),
            other => CacheError::Persistent(other),
        }
    }

    pub(crate) fn local(err: StorageError) -> Self {
        match err {
            StorageError::Loader(e) => CacheError::Loader(e),
            other => CacheError::Local(other),
        }
    }
}
