// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache entry data structure.
//!
//! A [`CacheEntry`] is what every tier stores and what a write event carries:
//! the opaque value bytes, the directives it was written with, and the write
//! timestamp that anchors expiry.

use serde::{Deserialize, Serialize};

use crate::options::EntryOptions;

/// Largest expiry (seconds) handed to a backend. Redis rejects `SET EX`
/// values whose millisecond deadline overflows a signed 64-bit integer.
pub const MAX_TTL_SECS: u64 = (i64::MAX / 2000) as u64;

/// A stored value plus its directives.
///
/// # Example
///
/// ```
/// use synced_cache::{CacheEntry, EntryOptions, CacheTtl};
///
/// let entry = CacheEntry::new(b"hello".to_vec(), EntryOptions::default().with_ttl(CacheTtl::Minute));
/// assert_eq!(entry.value, b"hello");
/// assert!(!entry.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque payload, never interpreted by the cache
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
    /// Directives the entry was written with
    #[serde(default)]
    pub options: EntryOptions,
    /// Write timestamp (epoch millis)
    pub written_at: i64,
}

impl CacheEntry {
    pub fn new(value: Vec<u8>, options: EntryOptions) -> Self {
        Self {
            value,
            options,
            written_at: now_millis(),
        }
    }

    /// Epoch millis after which the entry is gone, if it expires at all.
    /// TTLs too large to represent saturate at `i64::MAX` (never expires).
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.options.ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.to_duration().as_millis()).unwrap_or(i64::MAX);
            self.written_at.saturating_add(ttl_ms)
        })
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }

    /// Seconds left before expiry, rounded up and capped at [`MAX_TTL_SECS`].
    /// `None` for entries without TTL.
    #[must_use]
    pub fn remaining_ttl_secs(&self) -> Option<u64> {
        self.expires_at().map(|at| {
            let left = u64::try_from(at.saturating_sub(now_millis())).unwrap_or(0);
            left.div_ceil(1000).clamp(1, MAX_TTL_SECS)
        })
    }

    /// Approximate in-memory size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.value.len()
    }
}

/// Current wall-clock time in epoch millis.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Hex encoding for byte payloads so JSON documents stay binary-safe.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
