//! Backoff strategies for retry scheduling.
//!
//! A [`Backoff`] maps the number of completed attempts to the delay before
//! the next one. Strategies are plain objects so they can be shared across
//! tasks and swapped per submission.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use rand::Rng;

/// Computes the delay before the next attempt.
///
/// `attempts` is the number of executions already performed; strategies
/// return zero for attempt 0 so a fresh task starts immediately.
pub trait Backoff: Send + Sync {
    /// Returns the wait before attempt `attempts + 1`.
    fn delay(&self, attempts: u32) -> Duration;
}

/// Exponentially growing delay with a cap and jitter.
///
/// The raw delay is `factor^attempts` truncated to whole seconds, capped at
/// `max_interval` (no cap when zero), then multiplied by a uniform random
/// factor in `[0.8, 1.2)` to spread out retry storms.
pub struct ExponentialBackoff {
    factor: f64,
    max_interval: Duration,
}

impl ExponentialBackoff {
    /// Creates an exponential strategy with the given growth factor and cap.
    pub fn new(factor: f64, max_interval: Duration) -> Self {
        Self {
            factor,
            max_interval,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let mut delay = Duration::from_secs(self.factor.powi(attempts as i32) as u64);
        if !self.max_interval.is_zero() && delay > self.max_interval {
            delay = self.max_interval;
        }
        delay.mul_f64(rand::rng().random_range(0.8..1.2))
    }
}

/// Constant delay regardless of the attempt count. Primarily for tests.
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    /// Creates a fixed strategy that always waits `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Backoff for FixedBackoff {
    fn delay(&self, _attempts: u32) -> Duration {
        self.interval
    }
}

/// Adapter for closure-based strategies.
pub struct FnBackoff<F> {
    f: F,
}

impl<F> FnBackoff<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    /// Wraps a closure as a [`Backoff`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Backoff for FnBackoff<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempts: u32) -> Duration {
        (self.f)(attempts)
    }
}

/// The runtime default: exponential growth at factor 1.5, capped at 30s.
pub fn default_backoff() -> Arc<dyn Backoff> {
    static DEFAULT: OnceLock<Arc<dyn Backoff>> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| {
        Arc::new(ExponentialBackoff::new(1.5, Duration::from_secs(30)))
    }))
}
