//! Queued task execution for the runwell runtime.
//!
//! [`QueuedExecutor`] accepts submissions while running and dispatches them
//! through the retrying [`runwell_core::TaskRunner`]. Submissions flow
//! through two queues — waiting and running — driven by a single dispatch
//! task, with three per-submission policies shaping the flow:
//!
//! - **cleanup**: fast-fail and drain everything currently running before
//!   this task starts, which serializes completions into submission order
//! - **run_once**: execute the first attempt inline on the dispatch task,
//!   spawning a background worker only when a retry wait is scheduled
//! - **skip_prev**: discard all older still-waiting submissions at dispatch
//!   time — the pattern for "only the newest state matters" workloads
//!
//! Closing the executor fast-fails outstanding work and blocks until every
//! accepted task has reached a terminal state.

mod executor;
mod queue;

pub use executor::QueuedExecutor;
