//! The queued executor: concurrent submission, ordered dispatch.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use runwell_core::{ArcTask, RunOptions, TaskRunner, TaskSpec, Value};

use crate::queue::TaskQueue;

/// A two-queue task dispatcher.
///
/// Submissions land in a waiting queue and are moved to a running queue by a
/// single dispatch task; each accepted task then drives its own retry loop.
/// Per-submission policies shape dispatch:
///
/// - `cleanup`: fast-fail and drain everything running before this task
/// - `run_once`: run the first attempt inline on the dispatch task, so work
///   submitted with it executes in submission order
/// - `skip_prev`: discard all older still-waiting submissions at dispatch
///   time; discarded tasks never run and their callbacks never fire
///
/// Submitting never blocks on dispatch. [`cleanup`](Self::cleanup) and
/// [`close`](Self::close) block until every accepted task has finished.
///
/// # Example
///
/// ```
/// use runwell_core::{task_fn, RunOptions, Value};
/// use runwell_executor::QueuedExecutor;
///
/// # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
/// # async fn main() {
/// let executor = QueuedExecutor::new("jobs", RunOptions::new().cleanup(true));
/// let double = task_fn(|state| async move {
///     Ok(Value::from(state.as_i64().unwrap_or_default() * 2))
/// });
/// executor
///     .submit("double", double, Value::from(21), RunOptions::new())
///     .await;
/// executor.close().await;
/// # }
/// ```
#[derive(Clone)]
pub struct QueuedExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    default_opts: RunOptions,
    wait_q: TaskQueue,
    run_q: TaskQueue,
    recv_tx: mpsc::Sender<()>,
    stop_tx: mpsc::Sender<()>,
    closed: RwLock<bool>,
}

impl QueuedExecutor {
    /// Creates an executor and starts its dispatch loop. `opts` become the
    /// default option layer for every submission; an empty name is replaced
    /// with a unique one.
    pub fn new(name: impl Into<String>, opts: RunOptions) -> Self {
        let (recv_tx, recv_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let mut name = name.into();
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner>| {
            if name.is_empty() {
                name = format!("executor-{:p}", weak.as_ptr());
            }
            Inner {
                name,
                default_opts: opts,
                wait_q: TaskQueue::default(),
                run_q: TaskQueue::default(),
                recv_tx,
                stop_tx,
                closed: RwLock::new(false),
            }
        });
        tokio::spawn(run_loop(Arc::clone(&inner), recv_rx, stop_rx));
        Self { inner }
    }

    /// Name of this executor, used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Submits a task for execution. Returns as soon as the task is queued;
    /// a submission after [`close`](Self::close) is dropped with an error
    /// log.
    pub async fn submit(
        &self,
        name: impl Into<String>,
        exec: ArcTask,
        args: Value,
        opts: RunOptions,
    ) {
        self.submit_spec(TaskSpec::new(name, exec, args), opts).await;
    }

    /// Like [`submit`](Self::submit), for a prepared [`TaskSpec`]. Options
    /// merge executor defaults, then spec options, then `opts`.
    pub async fn submit_spec(&self, spec: TaskSpec, opts: RunOptions) {
        let closed = self.inner.closed.read().await;
        if *closed {
            tracing::error!(queue = %self.inner.name, task = %spec.name, "submit after close");
            return;
        }
        let merged = self
            .inner
            .default_opts
            .clone()
            .merge(&spec.opts)
            .merge(&opts);
        let runner = Arc::new(TaskRunner::new(self.inner.name.clone(), spec, merged));
        self.inner.wait_q.add(runner);
        let _ = self.inner.recv_tx.try_send(());
    }

    /// Fast-fails every queued and running task, then blocks until all of
    /// them have finished. New submissions are locked out for the duration.
    pub async fn cleanup(&self) {
        let closed = self.inner.closed.write().await;
        if *closed {
            tracing::error!(queue = %self.inner.name, "cleanup after close");
            return;
        }
        self.inner.cleanup_all().await;
    }

    /// Closes the executor: rejects further submissions, fast-fails and
    /// drains both queues, and stops the dispatch loop. A second close is a
    /// warned no-op.
    pub async fn close(&self) {
        let mut closed = self.inner.closed.write().await;
        if *closed {
            tracing::warn!(queue = %self.inner.name, "executor already closed");
            return;
        }
        *closed = true;
        self.inner.cleanup_all().await;
        let _ = self.inner.stop_tx.try_send(());
    }
}

impl Inner {
    async fn cleanup_all(&self) {
        self.wait_q.fast_fail_all();
        self.run_q.fast_fail_all();
        self.wait_q.drain().await;
        self.run_q.drain().await;
    }

    async fn cleanup_run_q(&self) {
        self.run_q.fast_fail_all();
        self.run_q.drain().await;
    }

}

async fn consume(inner: &Arc<Inner>) {
    let tasks = inner.wait_q.ready_tasks();
    for runner in tasks {
        if runner.options().is_cleanup() {
            inner.cleanup_run_q().await;
        }
        inner.run_q.add(Arc::clone(&runner));
        inner.wait_q.remove(&runner);
        if runner.options().is_run_once() {
            if runner.run_once().await {
                inner.run_q.remove(&runner);
            } else {
                let executor = Arc::clone(inner);
                tokio::spawn(async move {
                    runner.run_tail().await;
                    executor.run_q.remove(&runner);
                });
            }
        } else {
            let executor = Arc::clone(inner);
            tokio::spawn(async move {
                runner.run().await;
                executor.run_q.remove(&runner);
            });
        }
    }
}

async fn run_loop(
    inner: Arc<Inner>,
    mut recv_rx: mpsc::Receiver<()>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = recv_rx.recv() => consume(&inner).await,
            _ = stop_rx.recv() => {
                consume(&inner).await;
                return;
            }
        }
    }
}
