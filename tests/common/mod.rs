//! Shared helpers for the integration tests.

use runwell::{ArcTask, TaskFn as _, Value};

/// Drives a task to success, feeding each failure's returned state back in.
/// Every other failure the state takes a JSON dump/load round trip, the way
/// a durable caller resumes from a persisted snapshot.
///
/// Returns the final output and the number of failed attempts along the way.
pub async fn run_until_success(task: &ArcTask, input: Value) -> (Value, usize) {
    let mut state = input;
    let mut failures = 0;
    loop {
        match task.call(state).await {
            Ok(out) => return (out, failures),
            Err(failure) => {
                assert!(
                    !failure.error.is_runtime(),
                    "unexpected runtime error: {}",
                    failure.error
                );
                failures += 1;
                assert!(failures < 100_000, "task never converged");
                state = if failures % 2 == 0 {
                    round_trip(failure.state)
                } else {
                    failure.state
                };
            }
        }
    }
}

/// Simulates persisting a value and loading it back.
pub fn round_trip(value: Value) -> Value {
    let dumped = serde_json::to_string(&value).expect("state serializes");
    serde_json::from_str(&dumped).expect("state deserializes")
}
