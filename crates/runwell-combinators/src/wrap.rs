//! Adapters that lift typed functions into the uniform task shape.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{from_value, to_value};

use runwell_core::{task_fn, ArcTask, Error, Failure, TaskFn, TaskOutput, Value};

/// Lifts a typed synchronous function into a task function.
///
/// The dynamic input is coerced into `I` and the result serialized back; a
/// value that does not fit the declared type is a runtime error carrying the
/// original input as its state. The function's own failures pass through
/// untouched, so it stays in charge of the state a retry resumes from.
pub fn wrap_task<I, O, F>(f: F) -> ArcTask
where
    I: DeserializeOwned,
    O: Serialize,
    F: Fn(I) -> Result<O, Failure> + Send + Sync + 'static,
{
    task_fn(move |sin: Value| {
        let out = call_typed(&f, sin);
        futures::future::ready(out)
    })
}

/// Async flavor of [`wrap_task`] for typed `async fn` tasks.
pub fn wrap_task_async<I, O, F, Fut>(f: F) -> ArcTask
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, Failure>> + Send + 'static,
{
    let f = Arc::new(f);
    task_fn(move |sin: Value| {
        let f = Arc::clone(&f);
        async move {
            let input: I = match from_value(sin.clone()) {
                Ok(input) => input,
                Err(err) => return Err(coercion_failure(sin, err)),
            };
            match f(input).await {
                Ok(out) => serialize_output(sin, out),
                Err(failure) => Err(failure),
            }
        }
    })
}

/// Wraps a task so its errors are logged and swallowed; the returned state
/// still flows onward, but the task always reports success.
pub fn suppress_errors(task: ArcTask) -> ArcTask {
    task_fn(move |sin: Value| {
        let task = Arc::clone(&task);
        async move {
            match task.call(sin).await {
                Ok(out) => Ok(out),
                Err(failure) => {
                    tracing::error!(error = %failure.error, "task error suppressed");
                    Ok(failure.state)
                }
            }
        }
    })
}

/// Wraps a task so `callback` observes every invocation's outcome before it
/// is returned.
pub fn with_callback<F>(task: ArcTask, callback: F) -> ArcTask
where
    F: Fn(&TaskOutput) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    task_fn(move |sin: Value| {
        let task = Arc::clone(&task);
        let callback = Arc::clone(&callback);
        async move {
            let out = task.call(sin).await;
            callback(&out);
            out
        }
    })
}

fn call_typed<I, O, F>(f: &F, sin: Value) -> TaskOutput
where
    I: DeserializeOwned,
    O: Serialize,
    F: Fn(I) -> Result<O, Failure>,
{
    let input: I = match from_value(sin.clone()) {
        Ok(input) => input,
        Err(err) => return Err(coercion_failure(sin, err)),
    };
    match f(input) {
        Ok(out) => serialize_output(sin, out),
        Err(failure) => Err(failure),
    }
}

fn coercion_failure(sin: Value, err: serde_json::Error) -> Failure {
    Failure::new(sin, Error::runtime(format!("input coercion failed: {err}")))
}

fn serialize_output<O: Serialize>(sin: Value, out: O) -> TaskOutput {
    match to_value(out) {
        Ok(value) => Ok(value),
        Err(err) => Err(Failure::new(
            sin,
            Error::runtime(format!("output serialization failed: {err}")),
        )),
    }
}
