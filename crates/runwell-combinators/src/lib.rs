//! Resumable composition for the runwell task runtime.
//!
//! Three combinators build bigger tasks out of smaller ones, and each is
//! itself an ordinary task function:
//!
//! - [`pipe`]: sequential composition — each stage's output feeds the next
//! - [`map`]: data parallelism — one task applied to every element of a
//!   list or map input
//! - [`parallel`]: task parallelism — several tasks applied to one input
//!
//! The combinators carry *resumable state*: when any part fails, they
//! return a carrier value holding the partial progress alongside the joined
//! error. Feeding that carrier back in — directly on the next retry, or
//! after a JSON dump/load cycle across a process restart — resumes exactly
//! where work stopped. Carriers are detected by their `__runtime_*` marker
//! fields, so a fresh input is never confused with a resumed one.
//!
//! [`wrap_task`] and [`wrap_task_async`] lift strongly typed functions into
//! the uniform task shape, surfacing coercion failures as runtime errors.

mod map;
mod parallel;
mod pipe;
mod wrap;

pub use map::map;
pub use parallel::parallel;
pub use pipe::pipe;
pub use wrap::{suppress_errors, with_callback, wrap_task, wrap_task_async};

use runwell_core::Value;
use serde::Serialize;

/// Marker field identifying a pipeline carrier.
pub(crate) const MARKER_STEP: &str = "__runtime_step";
/// Marker field identifying a map or parallel carrier.
pub(crate) const MARKER_FAIL: &str = "__runtime_fail";

pub(crate) fn has_marker(value: &Value, marker: &str) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key(marker))
}

/// Serializes a carrier back into a task state value.
pub(crate) fn carrier_state<T: Serialize>(carrier: &T) -> Value {
    serde_json::to_value(carrier).unwrap_or(Value::Null)
}
