//! Retry delay policies.
//!
//! A policy hands out the delay before each retry and `None` once retrying
//! should stop. With `max_attempts(n)` a policy allows `n` calls in total:
//! the first attempt plus `n - 1` retries.

use std::time::Duration;

/// Default first delay of [`ExponentialBackoff`].
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Default cap on a single [`ExponentialBackoff`] delay.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Default growth factor of [`ExponentialBackoff`].
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// A stateful retry delay policy.
pub trait Backoff: Send + Sync {
    /// Delay before the next retry, or `None` to give up.
    fn next_backoff(&mut self) -> Option<Duration>;

    /// Start over, as if no attempt had been made.
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, Default)]
struct Attempts {
    max: Option<u32>,
    used: u32,
}

impl Attempts {
    /// Count one more call, failing once the limit would be exceeded.
    fn take(&mut self) -> bool {
        if let Some(max) = self.max {
            if self.used + 1 >= max {
                return false;
            }
        }
        self.used += 1;
        true
    }
}

/// The same delay before every retry.
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    interval: Duration,
    attempts: Attempts,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            attempts: Attempts::default(),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.attempts.max = Some(attempts);
        self
    }
}

impl Backoff for ConstantBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempts.take().then_some(self.interval)
    }

    fn reset(&mut self) {
        self.attempts.used = 0;
    }
}

/// Delays growing by `multiplier` per retry, capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max_interval: Duration,
    current: Duration,
    attempts: Attempts,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_INTERVAL)
    }
}

impl ExponentialBackoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
            current: initial,
            attempts: Attempts::default(),
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.attempts.max = Some(attempts);
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if !self.attempts.take() {
            return None;
        }
        let delay = self.current.min(self.max_interval);
        self.current = self.current.mul_f64(self.multiplier).min(self.max_interval);
        Some(delay)
    }

    fn reset(&mut self) {
        self.current = self.initial;
        self.attempts.used = 0;
    }
}
