//! Exponential backoff with jitter.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GTDFLOW_MAX_ATTEMPTS` | `3` | Transport calls per logical send, including the first |
//! | `GTDFLOW_RETRY_BASE_MS` | `500` | Delay before the first retry |
//! | `GTDFLOW_RETRY_MAX_MS` | `8000` | Upper bound on any single delay |

use std::time::Duration;

use rand::Rng;

use gtdflow_core::defaults;
use gtdflow_core::{Error, Result};

/// Retry budget and backoff curve for one logical send.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total transport calls allowed, including the first. At least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add uniform jitter in `[0, delay/4]` on top of the exponential delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Load from environment variables and validate.
    pub fn from_env() -> Result<Self> {
        let policy = Self {
            max_attempts: std::env::var("GTDFLOW_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::RETRY_MAX_ATTEMPTS),
            base_delay: Duration::from_millis(
                std::env::var("GTDFLOW_RETRY_BASE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults::RETRY_BASE_DELAY_MS),
            ),
            max_delay: Duration::from_millis(
                std::env::var("GTDFLOW_RETRY_MAX_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults::RETRY_MAX_DELAY_MS),
            ),
            jitter: true,
        };
        policy.validated()
    }

    pub fn validated(self) -> Result<Self> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "GTDFLOW_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::Config(format!(
                "retry max delay ({:?}) is below base delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(self)
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry + 1` (`retry` is zero-based).
    ///
    /// Always within `[base_delay, max_delay]`. A server `retry_after` hint
    /// raises the delay but never past `max_delay`.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry.min(31)));
        let mut delay = exp.min(self.max_delay);

        if self.jitter {
            let spread = delay.as_millis() as u64 / 4;
            if spread > 0 {
                let extra = rand::thread_rng().gen_range(0..=spread);
                delay += Duration::from_millis(extra);
            }
        }

        if let Some(hint) = retry_after {
            delay = delay.max(hint);
        }

        delay.min(self.max_delay).max(self.base_delay)
    }
}
