// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retrying Redis calls and bus subscriptions.
//!
//! Three schedules cover every caller in the crate:
//!
//! | Preset | Used by | Attempts | Delay |
//! |--------|---------|----------|-------|
//! | [`RetryConfig::startup`] | `RedisStore` / `RedisBus` connect | 5 | 200ms doubling, capped at 2s |
//! | [`RetryConfig::query`] | single Redis commands | 3 | 100ms doubling, capped at 2s |
//! | [`RetryConfig::reconnect`] | subscriber resubscribe | unbounded | fixed |
//!
//! ```
//! use synced_cache::RetryConfig;
//! use std::time::Duration;
//!
//! let resubscribe = RetryConfig::reconnect(Duration::from_millis(500));
//! assert_eq!(resubscribe.max_attempts, None);
//! assert_eq!(resubscribe.delay_after(10), Duration::from_millis(500));
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget and backoff schedule for one kind of call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Wait before the second attempt
    pub initial_delay: Duration,
    /// Ceiling for any single wait
    pub max_delay: Duration,
    /// Growth of the wait per failed attempt (1.0 keeps it fixed)
    pub factor: f64,
    /// Total attempts including the first; `None` retries until success
    pub max_attempts: Option<usize>,
}

impl RetryConfig {
    /// Connecting to Redis while building a store or bus.
    ///
    /// A wrong URL surfaces within a few seconds instead of hanging setup.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_attempts: Some(5),
        }
    }

    /// One Redis command on an established connection manager.
    #[must_use]
    pub fn query() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_attempts: Some(3),
        }
    }

    /// Resubscribing to the bus: forever, once per `delay`.
    #[must_use]
    pub fn reconnect(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            factor: 1.0,
            max_attempts: None,
        }
    }

    /// Wait after the `failures`-th consecutive failure (1-based).
    #[must_use]
    pub fn delay_after(&self, failures: usize) -> Duration {
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..failures {
            if delay >= self.max_delay {
                break;
            }
            delay = delay.mul_f64(self.factor).min(self.max_delay);
        }
        delay
    }

    fn exhausted(&self, failures: usize) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

/// Run `operation` until it succeeds or `config` runs out of attempts.
///
/// The last error is returned when the budget is spent.
pub async fn retry<F, Fut, T, E>(what: &str, config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut failures = 0usize;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if failures > 0 {
                    debug!(what, failures, "Recovered after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        failures += 1;
        if config.exhausted(failures) {
            warn!(what, failures, error = %err, "Giving up");
            return Err(err);
        }

        let delay = config.delay_after(failures);
        warn!(what, failures, error = %err, ?delay, "Retrying");
        tokio::time::sleep(delay).await;
    }
}
