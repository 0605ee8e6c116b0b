//! The uniform task function shape.
//!
//! Every unit of work in the runtime is a pure transformation from state to
//! state. State is a dynamic [`Value`] so that any partial progress survives
//! a JSON round trip; a failing invocation still yields a state, which is
//! exactly what the next attempt resumes from.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::Error;

/// Dynamic task state: any value that survives a JSON round trip.
pub type Value = serde_json::Value;

/// A failed attempt: the state to retry from, and what went wrong.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The state the next attempt resumes from. Usually the original input,
    /// or a carrier holding partial progress.
    pub state: Value,
    /// The error that ended the attempt.
    pub error: Error,
}

impl Failure {
    /// Pairs a resume state with an error.
    pub fn new(state: Value, error: Error) -> Self {
        Self { state, error }
    }

    /// Builds a failure from any serializable resume state.
    pub fn retry<T: Serialize>(state: T, error: Error) -> Self {
        Self {
            state: serde_json::to_value(state).unwrap_or(Value::Null),
            error,
        }
    }
}

/// Outcome of one task invocation.
pub type TaskOutput = Result<Value, Failure>;

/// Boxed future produced by a task function.
pub type BoxTaskFuture = BoxFuture<'static, TaskOutput>;

/// A unit of work: a pure transformation from state to state.
///
/// Implemented for any `Fn(Value) -> impl Future<Output = TaskOutput>`, so
/// async closures are task functions out of the box. Combinators implement
/// it directly for their runner types.
pub trait TaskFn: Send + Sync {
    /// Invokes the task on the given state.
    fn call(&self, state: Value) -> BoxTaskFuture;
}

/// Shared handle to a task function.
pub type ArcTask = Arc<dyn TaskFn>;

impl<F, Fut> TaskFn for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = TaskOutput> + Send + 'static,
{
    fn call(&self, state: Value) -> BoxTaskFuture {
        Box::pin(self(state))
    }
}

/// Lifts an async closure into a shared task handle.
pub fn task_fn<F, Fut>(f: F) -> ArcTask
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskOutput> + Send + 'static,
{
    Arc::new(f)
}

/// The task that returns its input untouched.
pub fn identity() -> ArcTask {
    task_fn(|state| async move { Ok(state) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn closures_are_task_functions() {
        let double = task_fn(|state| async move {
            let n = state.as_i64().unwrap_or_default();
            Ok(Value::from(n * 2))
        });
        assert_eq!(double.call(json!(21)).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn identity_returns_input() {
        let id = identity();
        assert_eq!(id.call(json!({"a": 1})).await.unwrap(), json!({"a": 1}));
    }

    #[test]
    fn retry_serializes_state() {
        let failure = Failure::retry(vec![1, 2, 3], Error::msg("boom"));
        assert_eq!(failure.state, json!([1, 2, 3]));
        assert_eq!(failure.error, Error::msg("boom"));
    }
}
