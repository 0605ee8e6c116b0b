//! The per-task retry state machine.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::options::RunOptions;
use crate::state::{TaskSpec, TaskState};
use crate::task::{ArcTask, Failure, TaskFn, TaskOutput, Value};
use crate::Error;

/// Runs a task function to completion on the calling task, retrying per the
/// given options, and returns the terminal outcome.
pub async fn run(
    name: impl Into<String>,
    exec: ArcTask,
    args: Value,
    opts: RunOptions,
) -> TaskOutput {
    run_spec(TaskSpec::new(name, exec, args), opts).await
}

/// Like [`run`], for a prepared [`TaskSpec`]. Call-site options override the
/// spec's own.
pub async fn run_spec(spec: TaskSpec, opts: RunOptions) -> TaskOutput {
    let merged = spec.opts.clone().merge(&opts);
    let runner = TaskRunner::new("default", spec, merged);
    runner.run().await;
    runner.output()
}

/// Runs specs sequentially, collecting every terminal state and joining the
/// errors of the ones that failed.
pub async fn run_spec_list(specs: Vec<TaskSpec>, opts: RunOptions) -> (Vec<Value>, Option<Error>) {
    let mut outputs = Vec::with_capacity(specs.len());
    let mut err_out = None;
    for spec in specs {
        match run_spec(spec, opts.clone()).await {
            Ok(out) => outputs.push(out),
            Err(failure) => {
                outputs.push(failure.state);
                err_out = Some(Error::append(err_out, failure.error));
            }
        }
    }
    (outputs, err_out)
}

/// Single-task retry state machine.
///
/// A runner owns one task's lifecycle: it invokes the task function, recovers
/// panics, classifies the failure, schedules backoff waits, honors
/// cancellation and expiration, and reports through the configured callbacks.
/// Exactly one driver makes progress at a time ([`run`](Self::run), or
/// [`run_once`](Self::run_once) followed by [`run_tail`](Self::run_tail));
/// [`fast_fail`](Self::fast_fail) may be called from anywhere, at any time.
pub struct TaskRunner {
    queue: String,
    name: String,
    exec: ArcTask,
    opts: RunOptions,
    inner: Mutex<RunnerInner>,
    fast_fail_tx: mpsc::Sender<()>,
    fast_fail_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

struct RunnerInner {
    state: TaskState,
    err: Option<Error>,
    delay: Duration,
}

impl TaskRunner {
    /// Creates a runner for `spec` on the named queue. `opts` must already be
    /// fully merged; the spec's own option layer is not consulted here.
    pub fn new(queue: impl Into<String>, spec: TaskSpec, opts: RunOptions) -> Self {
        let now = Utc::now();
        let TaskSpec {
            name, exec, args, ..
        } = spec;
        // one-slot cancellation signal; try_send keeps it latched, not queued
        let (fast_fail_tx, fast_fail_rx) = mpsc::channel(1);
        Self {
            queue: queue.into(),
            name: name.clone(),
            exec,
            opts,
            inner: Mutex::new(RunnerInner {
                state: TaskState::new(name, args, now),
                err: None,
                delay: Duration::ZERO,
            }),
            fast_fail_tx,
            fast_fail_rx: tokio::sync::Mutex::new(fast_fail_rx),
        }
    }

    /// Runs attempts until terminal, sleeping through every retry wait.
    pub async fn run(&self) {
        self.attempt().await;
        if !self.current_delay().is_zero() {
            self.retry_loop().await;
        }
        self.done();
    }

    /// Makes one attempt. Returns `true` if the task reached a terminal
    /// state, `false` if a retry wait was scheduled — finish it with
    /// [`run_tail`](Self::run_tail).
    pub async fn run_once(&self) -> bool {
        self.attempt().await;
        if !self.current_delay().is_zero() {
            return false;
        }
        self.done();
        true
    }

    /// Resumes the retry loop after a [`run_once`](Self::run_once) that
    /// returned `false`.
    pub async fn run_tail(&self) {
        self.retry_loop().await;
        self.done();
    }

    /// Requests that the runner abandon further retries at the next
    /// scheduling point: the current retry wait (or the next one scheduled)
    /// becomes an immediate final attempt. Idempotent, safe after
    /// termination, and never interrupts an in-flight task call.
    pub fn fast_fail(&self) {
        let _ = self.fast_fail_tx.try_send(());
    }

    /// Name of the queue this runner was created for.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Name of the task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The options this runner executes under.
    pub fn options(&self) -> &RunOptions {
        &self.opts
    }

    /// Snapshot of the task state.
    pub fn task_state(&self) -> TaskState {
        self.lock().state.clone()
    }

    /// Terminal outcome: the final state, paired with the final error if the
    /// last attempt failed. Meaningful once the runner is terminal.
    pub fn output(&self) -> TaskOutput {
        let inner = self.lock();
        match &inner.err {
            None => Ok(inner.state.stateful.clone()),
            Some(err) => Err(Failure::new(inner.state.stateful.clone(), err.clone())),
        }
    }

    async fn retry_loop(&self) {
        loop {
            let delay = self.current_delay();
            if delay.is_zero() {
                return;
            }
            self.announce_retry(delay);
            let fast_failed = {
                let mut rx = self.fast_fail_rx.lock().await;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => false,
                    _ = rx.recv() => true,
                }
            };
            // one more attempt either way: on fast-fail it captures the
            // post-abandonment state before the loop exits
            self.attempt().await;
            if fast_failed {
                return;
            }
        }
    }

    async fn attempt(&self) {
        let current = self.lock().state.stateful.clone();
        let exec = Arc::clone(&self.exec);
        let result = std::panic::AssertUnwindSafe(async move { exec.call(current).await })
            .catch_unwind()
            .await;
        let mut delay = {
            let mut inner = self.lock();
            match result {
                Ok(Ok(next)) => {
                    inner.state.stateful = next;
                    inner.err = None;
                }
                Ok(Err(failure)) => {
                    inner.state.stateful = failure.state;
                    inner.err = Some(failure.error);
                }
                // a panicking task keeps its pre-attempt state
                Err(panic) => {
                    inner.err = Some(Error::runtime(panic_message(panic.as_ref())));
                }
            }
            inner.state.executed_count += 1;
            inner.state.error = inner
                .err
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            inner.state.updated_at = Utc::now();
            match &inner.err {
                Some(err) if !err.is_runtime() => self.next_delay(&inner),
                _ => Duration::ZERO,
            }
        };
        if !delay.is_zero() && self.take_fast_fail().await {
            delay = Duration::ZERO;
        }
        self.lock().delay = delay;
    }

    fn next_delay(&self, inner: &RunnerInner) -> Duration {
        let executed = inner.state.executed_count;
        let expiration = self.opts.deadline();
        if expiration.is_none() && executed >= self.opts.retries() {
            return Duration::ZERO;
        }
        let mut delay = self.opts.delay_for(executed);
        if let Some(expiration) = expiration {
            let elapsed = (Utc::now() - inner.state.created_at)
                .to_std()
                .unwrap_or_default();
            if elapsed >= expiration {
                return Duration::ZERO;
            }
            delay = delay.min(expiration - elapsed);
        }
        delay
    }

    fn announce_retry(&self, delay: Duration) {
        let (state, err) = self.snapshot();
        for cb in self.opts.callbacks() {
            cb(&state, err.as_ref());
        }
        for cb in self.opts.retry_callbacks() {
            cb(&state, delay, err.as_ref());
        }
    }

    fn done(&self) {
        {
            let mut inner = self.lock();
            inner.state.finished = true;
            inner.state.success = inner.err.is_none();
        }
        let (state, err) = self.snapshot();
        for cb in self.opts.callbacks() {
            cb(&state, err.as_ref());
        }
    }

    fn snapshot(&self) -> (TaskState, Option<Error>) {
        let inner = self.lock();
        (inner.state.clone(), inner.err.clone())
    }

    fn current_delay(&self) -> Duration {
        self.lock().delay
    }

    async fn take_fast_fail(&self) -> bool {
        self.fast_fail_rx.lock().await.try_recv().is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, RunnerInner> {
        self.inner.lock().expect("task runner state poisoned")
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map(|message| format!("task panicked: {message}"))
        .unwrap_or_else(|| "task panicked".to_string())
}
