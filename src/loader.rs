// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Loaders compute values on a full cache miss.
//!
//! A loader answers with a [`LoadOutcome`]:
//! - `Found` → cache it in both tiers and broadcast it,
//! - `Uncached` → hand it to the caller but store it nowhere,
//! - `NotFound` → nothing to return.
//!
//! Any `Fn(&str) -> LoadOutcome` closure is a loader. Implement the trait
//! directly when loading needs to await I/O or can fail.
//!
//! ```rust
//! use synced_cache::{Loader, LoadOutcome};
//!
//! let loader = |key: &str| LoadOutcome::found(format!("{key} value"));
//! # fn takes(_: &dyn Loader) {}
//! takes(&loader);
//! ```

use async_trait::async_trait;
use thiserror::Error;

/// Loader failure, surfaced to the caller of `fetch`/`fetch_multi`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("loader failed for '{key}': {message}")]
pub struct LoadError {
    pub key: String,
    pub message: String,
}

impl LoadError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// What a loader produced for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A value to cache and propagate
    Found(Vec<u8>),
    /// No value exists
    NotFound,
    /// A value to return without caching it anywhere
    Uncached(Vec<u8>),
}

impl LoadOutcome {
    pub fn found(value: impl Into<Vec<u8>>) -> Self {
        Self::Found(value.into())
    }

    pub fn uncached(value: impl Into<Vec<u8>>) -> Self {
        Self::Uncached(value.into())
    }

    /// The value handed back to the caller, cached or not.
    #[must_use]
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            LoadOutcome::Found(v) | LoadOutcome::Uncached(v) => Some(v),
            LoadOutcome::NotFound => None,
        }
    }
}

#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> Result<LoadOutcome, LoadError>;
}

#[async_trait]
impl<F> Loader for F
where
    F: Fn(&str) -> LoadOutcome + Send + Sync,
{
    async fn load(&self, key: &str) -> Result<LoadOutcome, LoadError> {
        Ok(self(key))
    }
}
