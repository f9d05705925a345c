//! Batch-wide throttle policy.
//!
//! Per-request backoff lives in the inference client. The governor reacts to
//! throttling across the whole batch: each throttle signal halves the number
//! of jobs allowed in flight and doubles a pause between dispatches; a run of
//! clean completions earns the capacity back one slot at a time.

use std::time::Duration;

/// Adaptive in-flight limit and inter-dispatch delay.
#[derive(Debug, Clone)]
pub struct ThrottleGovernor {
    ceiling: usize,
    limit: usize,
    delay: Duration,
    base_delay: Duration,
    max_delay: Duration,
    recovery_successes: u32,
    clean_streak: u32,
}

impl ThrottleGovernor {
    pub fn new(
        ceiling: usize,
        base_delay: Duration,
        max_delay: Duration,
        recovery_successes: u32,
    ) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            ceiling,
            limit: ceiling,
            delay: Duration::ZERO,
            base_delay,
            max_delay: max_delay.max(base_delay),
            recovery_successes: recovery_successes.max(1),
            clean_streak: 0,
        }
    }

    /// Jobs currently allowed in flight.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Minimum gap between two dispatches.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn is_throttled(&self) -> bool {
        self.limit < self.ceiling || !self.delay.is_zero()
    }

    /// A job observed throttling (even if it eventually succeeded).
    pub fn on_throttle(&mut self) {
        self.clean_streak = 0;
        self.limit = (self.limit / 2).max(1);
        self.delay = if self.delay.is_zero() {
            self.base_delay
        } else {
            (self.delay * 2).min(self.max_delay)
        };
    }

    /// A job completed without any throttling. Returns true when capacity
    /// was restored.
    pub fn on_clean(&mut self) -> bool {
        if !self.is_throttled() {
            return false;
        }
        self.clean_streak += 1;
        if self.clean_streak < self.recovery_successes {
            return false;
        }
        self.clean_streak = 0;
        if self.limit < self.ceiling {
            self.limit += 1;
        }
        if self.limit == self.ceiling {
            self.delay = Duration::ZERO;
        }
        true
    }

    /// A job failed for a reason unrelated to throttling.
    pub fn on_failure(&mut self) {
        self.clean_streak = 0;
    }
}
