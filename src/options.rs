// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-operation and per-instance options.
//!
//! synced-cache routes every mutation to the local tier (always), the
//! persistent tier (unless `persist` is off) and the bus (unless `silent`).
//! The caller decides, the cache just follows the flags.
//!
//! # Example
//!
//! ```rust
//! use synced_cache::{WriteOptions, CacheTtl};
//!
//! // Default: local + persistent + broadcast
//! let default_opts = WriteOptions::default();
//!
//! // Keep it in this process only, tell nobody
//! let local = WriteOptions::default().local_only().silent();
//!
//! // Expire after an hour everywhere
//! let hourly = WriteOptions::default().with_ttl(CacheTtl::Hour);
//! assert!(hourly.persist);
//! ```

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;

/// Standard cache TTL values.
///
/// The TTL travels with the entry, so every tier and every process expires
/// the same entry at the same wall-clock instant.
///
/// ```rust
/// use synced_cache::CacheTtl;
/// use std::time::Duration;
///
/// assert_eq!(CacheTtl::Hour.to_duration(), Duration::from_secs(3600));
/// assert_eq!(CacheTtl::custom_secs(90).as_secs(), 90);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTtl {
    /// 1 minute
    Minute,
    /// 5 minutes
    Short,
    /// 15 minutes
    Medium,
    /// 1 hour
    Hour,
    /// 24 hours
    Day,
    /// 7 days
    Week,
    /// Custom duration in seconds
    Custom(u64),
}

impl CacheTtl {
    /// Create a custom TTL from seconds.
    #[must_use]
    pub fn custom_secs(secs: u64) -> Self {
        Self::Custom(secs)
    }

    /// Convert to Duration.
    #[must_use]
    pub fn to_duration(self) -> Duration {
        match self {
            CacheTtl::Minute => Duration::from_secs(60),
            CacheTtl::Short => Duration::from_secs(5 * 60),
            CacheTtl::Medium => Duration::from_secs(15 * 60),
            CacheTtl::Hour => Duration::from_secs(60 * 60),
            CacheTtl::Day => Duration::from_secs(24 * 60 * 60),
            CacheTtl::Week => Duration::from_secs(7 * 24 * 60 * 60),
            CacheTtl::Custom(secs) => Duration::from_secs(secs),
        }
    }

    /// Get the TTL in seconds (used for Redis `SET EX`).
    #[must_use]
    pub fn as_secs(self) -> u64 {
        self.to_duration().as_secs()
    }
}

impl From<Duration> for CacheTtl {
    /// Convert a Duration to a CacheTtl, keeping exact standard values and
    /// falling back to `Custom` for anything else.
    fn from(d: Duration) -> Self {
        match d.as_secs() {
            60 => CacheTtl::Minute,
            300 => CacheTtl::Short,
            900 => CacheTtl::Medium,
            3600 => CacheTtl::Hour,
            86_400 => CacheTtl::Day,
            604_800 => CacheTtl::Week,
            secs => CacheTtl::Custom(secs),
        }
    }
}

/// Cache directives stored with every entry and relayed on the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Expiry relative to the write time. `None` means no expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<CacheTtl>,

    /// Compression hint for the persistent tier.
    #[serde(default)]
    pub compress: bool,
}

impl EntryOptions {
    #[must_use]
    pub fn with_ttl(mut self, ttl: CacheTtl) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }
}

/// Options for [`SyncedCache::write`](crate::SyncedCache::write).
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Also write to the persistent tier.
    ///
    /// Default: `true`
    pub persist: bool,

    /// Skip the broadcast to other instances.
    ///
    /// Default: `false`
    pub silent: bool,

    /// Entry directives. `None` uses the cache's defaults.
    pub entry: Option<EntryOptions>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            persist: true,
            silent: false,
            entry: None,
        }
    }
}

impl WriteOptions {
    /// Do not touch the persistent tier.
    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.persist = false;
        self
    }

    /// Do not broadcast.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Expire the entry after `ttl`.
    #[must_use]
    pub fn with_ttl(mut self, ttl: CacheTtl) -> Self {
        self.entry = Some(self.entry.unwrap_or_default().with_ttl(ttl));
        self
    }

    /// Replace the entry directives.
    #[must_use]
    pub fn with_entry(mut self, entry: EntryOptions) -> Self {
        self.entry = Some(entry);
        self
    }
}

/// Options for [`SyncedCache::delete`](crate::SyncedCache::delete).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    pub persist: bool,
    pub silent: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            persist: true,
            silent: false,
        }
    }
}

impl DeleteOptions {
    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.persist = false;
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Options for [`SyncedCache::clear`](crate::SyncedCache::clear).
pub type ClearOptions = DeleteOptions;

/// Per-instance behaviour of a [`SyncedCache`](crate::SyncedCache).
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Register with the subscriber and broadcast mutations.
    ///
    /// Default: `true`
    pub sync: bool,

    /// Bypass every tier and always call the loader.
    ///
    /// Default: `false`
    pub force_miss: bool,

    /// Broadcast `clear()` to other instances.
    ///
    /// Default: `true`
    pub propagate_clear: bool,

    /// Directives applied when an operation does not carry its own.
    pub default_entry: EntryOptions,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            sync: true,
            force_miss: false,
            propagate_clear: true,
            default_entry: EntryOptions::default(),
        }
    }
}

impl CacheOptions {
    /// Options for a cache that never talks to the bus.
    #[must_use]
    pub fn unsynced() -> Self {
        Self {
            sync: false,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_force_miss(mut self, force_miss: bool) -> Self {
        self.force_miss = force_miss;
        self
    }
}

impl From<&SyncConfig> for CacheOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            sync: config.sync,
            force_miss: config.force_miss,
            propagate_clear: config.propagate_clear,
            default_entry: EntryOptions {
                ttl: config.default_ttl_secs.map(|secs| CacheTtl::from(Duration::from_secs(secs))),
                compress: config.compress,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_write_options() {
        let opts = WriteOptions::default();
        assert!(opts.persist);
        assert!(!opts.silent);
        assert!(opts.entry.is_none());
    }

    #[test]
    fn test_write_options_builders() {
        let opts = WriteOptions::default().local_only().silent();
        assert!(!opts.persist);
        assert!(opts.silent);

        let opts = WriteOptions::default().with_ttl(CacheTtl::Day);
        assert_eq!(opts.entry.unwrap().ttl, Some(CacheTtl::Day));
    }

    #[test]
    fn test_with_ttl_keeps_compress_hint() {
        let opts = WriteOptions::default()
            .with_entry(EntryOptions::default().compressed())
            .with_ttl(CacheTtl::Minute);
        let entry = opts.entry.unwrap();
        assert!(entry.compress);
        assert_eq!(entry.ttl, Some(CacheTtl::Minute));
    }

    #[test]
    fn test_delete_options() {
        let opts = DeleteOptions::default();
        assert!(opts.persist);
        assert!(!opts.silent);

        let opts = DeleteOptions::default().local_only().silent();
        assert!(!opts.persist);
        assert!(opts.silent);
    }

    #[test]
    fn test_cache_options_defaults() {
        let opts = CacheOptions::default();
        assert!(opts.sync);
        assert!(!opts.force_miss);
        assert!(opts.propagate_clear);

        assert!(!CacheOptions::unsynced().sync);
        assert!(CacheOptions::default().with_force_miss(true).force_miss);
    }

    #[test]
    fn test_cache_options_from_config() {
        let config = SyncConfig {
            sync: false,
            force_miss: true,
            default_ttl_secs: Some(3600),
            ..Default::default()
        };
        let opts = CacheOptions::from(&config);
        assert!(!opts.sync);
        assert!(opts.force_miss);
        assert_eq!(opts.default_entry.ttl, Some(CacheTtl::Hour));
    }

    #[test]
    fn test_cache_ttl_to_duration() {
        assert_eq!(CacheTtl::Minute.to_duration(), Duration::from_secs(60));
        assert_eq!(CacheTtl::Short.to_duration(), Duration::from_secs(300));
        assert_eq!(CacheTtl::Hour.to_duration(), Duration::from_secs(3600));
        assert_eq!(CacheTtl::Day.to_duration(), Duration::from_secs(86400));
        assert_eq!(CacheTtl::Custom(123).to_duration(), Duration::from_secs(123));
    }

    #[test]
    fn test_cache_ttl_from_duration() {
        assert_eq!(CacheTtl::from(Duration::from_secs(60)), CacheTtl::Minute);
        assert_eq!(CacheTtl::from(Duration::from_secs(3600)), CacheTtl::Hour);
        // Non-standard values are kept exact
        assert_eq!(CacheTtl::from(Duration::from_secs(45)), CacheTtl::Custom(45));
    }
}
