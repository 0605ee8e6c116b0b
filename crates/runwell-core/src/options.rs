//! Per-submission execution options.
//!
//! Options are an immutable bag merged left-to-right: the executor publishes
//! defaults, a spec declares per-task options, and a submit call adds
//! one-off overrides. Later layers override set scalars and append to the
//! callback lists.

use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{default_backoff, Backoff};
use crate::state::{RetryCallback, TaskCallback, TaskState};
use crate::Error;

/// Options controlling how a task is retried, scheduled, and observed.
#[derive(Clone, Default)]
pub struct RunOptions {
    retry_count: Option<u32>,
    expiration: Option<Duration>,
    backoff: Option<Arc<dyn Backoff>>,
    cleanup: Option<bool>,
    skip_prev: Option<bool>,
    run_once: Option<bool>,
    callbacks: Vec<TaskCallback>,
    retry_callbacks: Vec<RetryCallback>,
}

impl RunOptions {
    /// An empty option bag: no retries, no expiration, default backoff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of re-attempts after the first failure. While an
    /// [`expiration`](Self::expiration) is set and unexpired, it takes
    /// precedence over this bound.
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Wall-clock deadline measured from task creation. Bounds the total
    /// time spent across retry waits, not the duration of any single
    /// attempt.
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Backoff strategy for retry waits. Defaults to exponential growth at
    /// factor 1.5 capped at 30s.
    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Fast-fail and drain everything currently running before this task is
    /// dispatched.
    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    /// Abandon all older still-waiting submissions when this one is
    /// dequeued. Discarded submissions never run and their callbacks never
    /// fire.
    pub fn skip_prev(mut self, skip: bool) -> Self {
        self.skip_prev = Some(skip);
        self
    }

    /// Run the first attempt inline on the dispatch thread, spawning a
    /// background worker only when a retry wait is scheduled. Recommended
    /// when tasks are serial or very lightweight.
    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = Some(run_once);
        self
    }

    /// Adds a callback invoked on every attempt and on final completion.
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskState, Option<&Error>) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(f));
        self
    }

    /// Adds a callback invoked immediately before each scheduled retry wait.
    pub fn retry_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskState, Duration, Option<&Error>) + Send + Sync + 'static,
    {
        self.retry_callbacks.push(Arc::new(f));
        self
    }

    /// Folds a later option layer over this one: set scalars override,
    /// callback lists append in registration order.
    pub fn merge(mut self, later: &RunOptions) -> Self {
        if later.retry_count.is_some() {
            self.retry_count = later.retry_count;
        }
        if later.expiration.is_some() {
            self.expiration = later.expiration;
        }
        if let Some(backoff) = &later.backoff {
            self.backoff = Some(Arc::clone(backoff));
        }
        if later.cleanup.is_some() {
            self.cleanup = later.cleanup;
        }
        if later.skip_prev.is_some() {
            self.skip_prev = later.skip_prev;
        }
        if later.run_once.is_some() {
            self.run_once = later.run_once;
        }
        self.callbacks.extend(later.callbacks.iter().cloned());
        self.retry_callbacks
            .extend(later.retry_callbacks.iter().cloned());
        self
    }

    /// Resolved retry bound (0 when unset).
    pub fn retries(&self) -> u32 {
        self.retry_count.unwrap_or(0)
    }

    /// Resolved expiration, if one was set.
    pub fn deadline(&self) -> Option<Duration> {
        self.expiration
    }

    /// Delay before the next attempt, via the configured or default backoff.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        match &self.backoff {
            Some(backoff) => backoff.delay(attempts),
            None => default_backoff().delay(attempts),
        }
    }

    pub fn is_cleanup(&self) -> bool {
        self.cleanup.unwrap_or(false)
    }

    pub fn is_skip_prev(&self) -> bool {
        self.skip_prev.unwrap_or(false)
    }

    pub fn is_run_once(&self) -> bool {
        self.run_once.unwrap_or(false)
    }

    pub fn callbacks(&self) -> &[TaskCallback] {
        &self.callbacks
    }

    pub fn retry_callbacks(&self) -> &[RetryCallback] {
        &self.retry_callbacks
    }
}
