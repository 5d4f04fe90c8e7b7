// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for synced caches and their subscriber.
//!
//! # Example
//!
//! ```
//! use synced_cache::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.reconnect_delay_ms, 1000);
//! assert_eq!(config.ready_timeout_ms, 10_000);
//!
//! // Full config
//! let config = SyncConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     redis_prefix: Some("myapp:".into()),
//!     channel_prefix: "myapp:".into(),
//!     default_ttl_secs: Some(3600),
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;
use serde::Deserialize;

/// Configuration for a process's synced caches.
///
/// All fields have sensible defaults. Loading the values (files, env) is
/// left to the embedding application; this struct only deserializes.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Redis connection string for the persistent tier and bus (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Key prefix for the persistent tier (e.g., "myapp:" → "myapp:user.alice")
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// Prefix for bus topics (e.g., "myapp:" → "myapp:cache.writes")
    #[serde(default)]
    pub channel_prefix: String,

    /// Register caches with the subscriber and broadcast mutations
    #[serde(default = "default_true")]
    pub sync: bool,

    /// Bypass every tier and always call the loader
    #[serde(default)]
    pub force_miss: bool,

    /// Broadcast `clear()` to other instances
    #[serde(default = "default_true")]
    pub propagate_clear: bool,

    /// Fixed delay between subscriber reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for `start(wait_for_ready = true)`
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Default expiry for entries written without explicit options
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,

    /// Default compression hint for entries written without explicit options
    #[serde(default)]
    pub compress: bool,

    /// Payloads smaller than this are stored uncompressed even when hinted
    #[serde(default = "default_compress_threshold_bytes")]
    pub compress_threshold_bytes: usize,
}

/// Floor for the subscriber reconnect delay; a zero delay would spin
/// against a bus that is down.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(10);

fn default_true() -> bool { true }
fn default_reconnect_delay_ms() -> u64 { 1000 }
fn default_ready_timeout_ms() -> u64 { 10_000 }
fn default_compress_threshold_bytes() -> usize { 1024 } // 1 KB

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_prefix: None,
            channel_prefix: String::new(),
            sync: default_true(),
            force_miss: false,
            propagate_clear: default_true(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            default_ttl_secs: None,
            compress: false,
            compress_threshold_bytes: default_compress_threshold_bytes(),
        }
    }
}

impl SyncConfig {
    /// Delay between resubscribe attempts, never below [`MIN_RECONNECT_DELAY`].
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms).max(MIN_RECONNECT_DELAY)
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}
