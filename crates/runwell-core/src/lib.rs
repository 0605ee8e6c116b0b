//! Core of the runwell task runtime.
//!
//! This crate holds the pieces everything else builds on:
//!
//! - the error model ([`Error`]): retryable vs runtime failures, joined
//!   sibling errors with transitive runtime detection
//! - backoff strategies ([`Backoff`], [`ExponentialBackoff`],
//!   [`FixedBackoff`])
//! - the uniform task shape ([`TaskFn`], [`TaskOutput`], [`Failure`]): a
//!   pure `state -> state` transformation over JSON-stable values
//! - per-submission options ([`RunOptions`]) merged executor-defaults →
//!   spec → call-site
//! - the retrying [`TaskRunner`] state machine with cancellation,
//!   expiration, and callbacks
//! - the [`Postman`] batching event pump
//!
//! # Example
//!
//! ```
//! use runwell_core::{run, task_fn, Error, Failure, RunOptions, FixedBackoff, Value};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let flaky = task_fn(|state| async move {
//!     let n = state.as_i64().unwrap_or_default();
//!     if n < 3 {
//!         // hand back the state to resume from, and the reason
//!         Err(Failure::retry(n + 1, Error::msg("not ready")))
//!     } else {
//!         Ok(Value::from(n * 10))
//!     }
//! });
//!
//! let opts = RunOptions::new()
//!     .retry_count(5)
//!     .backoff(FixedBackoff::new(Duration::from_millis(1)));
//! let out = run("warmup", flaky, Value::from(0), opts).await.unwrap();
//! assert_eq!(out, Value::from(30));
//! # }
//! ```

mod backoff;
mod error;
mod options;
mod postman;
mod runner;
mod state;
mod task;

pub use backoff::{default_backoff, Backoff, ExponentialBackoff, FixedBackoff, FnBackoff};
pub use error::Error;
pub use options::RunOptions;
pub use postman::{Consumer, Postman};
pub use runner::{run, run_spec, run_spec_list, TaskRunner};
pub use state::{RetryCallback, TaskCallback, TaskSpec, TaskState};
pub use task::{identity, task_fn, ArcTask, BoxTaskFuture, Failure, TaskFn, TaskOutput, Value};
