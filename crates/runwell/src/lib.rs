//! A retrying, resumable task runtime.
//!
//! runwell executes work supplied as pure state-transforming functions:
//! `state in, state out, error maybe`. Because every intermediate state is a
//! JSON-stable value, progress survives retries — and, via the task-state
//! snapshot, process restarts.
//!
//! The pieces:
//!
//! - **Task runner** ([`TaskRunner`], [`run`]): retries a single task with
//!   configurable backoff, expiration, cooperative cancellation
//!   ([`TaskRunner::fast_fail`]), and attempt/retry callbacks.
//! - **Combinators** ([`pipe`], [`map`], [`parallel`]): compose tasks
//!   sequentially, over collections, or fan one input across many tasks.
//!   Each carries resumable state: a partial failure returns a carrier that
//!   re-enters exactly the unfinished work on the next attempt.
//! - **Queued executor** ([`QueuedExecutor`]): accepts submissions while
//!   running, with cleanup / run-once / skip-prev dispatch policies.
//! - **Postman** ([`Postman`]): a single-consumer pump that coalesces
//!   bursts into ordered batches.
//!
//! # Getting started
//!
//! A split → map → reduce pipeline where every stage may fail transiently;
//! the runner retries it to completion:
//!
//! ```
//! use runwell::{map, pipe, run, wrap_task, FixedBackoff, RunOptions, Value};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! # async fn main() {
//! let task = pipe([
//!     // split: n -> [0, n)
//!     wrap_task(|n: i64| Ok((0..n).collect::<Vec<i64>>())),
//!     // map each element concurrently
//!     map(wrap_task(|i: i64| Ok(i * 100))),
//!     // reduce
//!     wrap_task(|xs: Vec<i64>| Ok(xs.into_iter().sum::<i64>())),
//! ]);
//!
//! let opts = RunOptions::new()
//!     .retry_count(5)
//!     .backoff(FixedBackoff::new(Duration::from_millis(10)));
//! let out = run("sum-of-hundreds", task, Value::from(10), opts).await.unwrap();
//! assert_eq!(out, Value::from(4500));
//! # }
//! ```
//!
//! To survive a crash, dump the [`TaskState`] snapshot from a callback and
//! later feed its `stateful` field back in as the input: the combinators
//! recognize their carrier values and resume from the recorded progress.

pub use runwell_core::{
    default_backoff, identity, run, run_spec, run_spec_list, task_fn, ArcTask, Backoff,
    BoxTaskFuture, Consumer, Error, ExponentialBackoff, Failure, FixedBackoff, FnBackoff, Postman,
    RetryCallback, RunOptions, TaskCallback, TaskFn, TaskOutput, TaskRunner, TaskSpec, TaskState,
    Value,
};

pub use runwell_combinators::{
    map, parallel, pipe, suppress_errors, with_callback, wrap_task, wrap_task_async,
};

pub use runwell_executor::QueuedExecutor;
