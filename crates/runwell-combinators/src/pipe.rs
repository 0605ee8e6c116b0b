//! Sequential composition with resumable progress.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::from_value;

use runwell_core::{identity, ArcTask, BoxTaskFuture, Error, Failure, TaskFn, TaskOutput, Value};

use crate::{carrier_state, has_marker, MARKER_STEP};

/// Resumable pipeline position: the next stage to run, the pipeline length
/// at construction, and the value flowing between stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PipeState {
    #[serde(rename = "__runtime_step")]
    step: usize,
    #[serde(rename = "__runtime_count")]
    count: usize,
    #[serde(rename = "__runtime_data")]
    data: Value,
}

/// Composes tasks in series: each stage's output becomes the next stage's
/// input, like a shell pipe.
///
/// An empty pipe is the identity task and a singleton pipe is its only
/// stage. Longer pipes are resumable: when a stage fails, the returned
/// state records which stage to re-enter and the value it received, so a
/// retry (even one crossing a snapshot round trip) picks up at the failing
/// stage instead of the beginning.
pub fn pipe(tasks: impl IntoIterator<Item = ArcTask>) -> ArcTask {
    let mut tasks: Vec<ArcTask> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return identity();
    }
    if tasks.len() == 1 {
        return tasks.remove(0);
    }
    Arc::new(PipeRunner {
        tasks: Arc::from(tasks),
    })
}

struct PipeRunner {
    tasks: Arc<[ArcTask]>,
}

impl TaskFn for PipeRunner {
    fn call(&self, state: Value) -> BoxTaskFuture {
        let tasks = Arc::clone(&self.tasks);
        Box::pin(run_pipe(tasks, state))
    }
}

async fn run_pipe(tasks: Arc<[ArcTask]>, sin: Value) -> TaskOutput {
    let count = tasks.len();
    let mut ctx = if has_marker(&sin, MARKER_STEP) {
        let ctx: PipeState = match from_value(sin.clone()) {
            Ok(ctx) => ctx,
            Err(err) => {
                return Err(Failure::new(
                    sin,
                    Error::runtime(format!("invalid pipeline state: {err}")),
                ));
            }
        };
        if ctx.count != count {
            return Err(Failure::new(
                sin,
                Error::runtime(format!(
                    "pipeline length changed: state has {}, pipeline has {}",
                    ctx.count, count
                )),
            ));
        }
        if ctx.step >= count {
            return Err(Failure::new(
                sin,
                Error::runtime(format!(
                    "pipeline step {} out of range for {} stages",
                    ctx.step, count
                )),
            ));
        }
        ctx
    } else {
        PipeState {
            step: 0,
            count,
            data: sin,
        }
    };

    while ctx.step < count {
        let data = std::mem::take(&mut ctx.data);
        match tasks[ctx.step].call(data).await {
            Ok(out) => {
                ctx.data = out;
                ctx.step += 1;
            }
            Err(failure) => {
                // step stays on the failing stage so a retry re-enters it
                ctx.data = failure.state;
                return Err(Failure::new(carrier_state(&ctx), failure.error));
            }
        }
    }
    // succeeded: the carrier is dropped, only the data flows out
    Ok(ctx.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwell_core::task_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn add(amount: i64) -> ArcTask {
        task_fn(move |state| async move {
            let n = state.as_i64().unwrap_or_default();
            Ok(Value::from(n + amount))
        })
    }

    fn failing_until(calls: Arc<AtomicUsize>, succeed_at: usize, amount: i64) -> ArcTask {
        task_fn(move |state| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call < succeed_at {
                    Err(Failure::new(state, Error::msg("transient")))
                } else {
                    let n = state.as_i64().unwrap_or_default();
                    Ok(Value::from(n + amount))
                }
            }
        })
    }

    #[tokio::test]
    async fn empty_pipe_is_identity() {
        let task = pipe(Vec::new());
        assert_eq!(task.call(json!(41)).await.unwrap(), json!(41));
    }

    #[tokio::test]
    async fn singleton_pipe_is_the_task() {
        let task = pipe([add(1)]);
        assert_eq!(task.call(json!(41)).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn stages_chain_in_order() {
        let task = pipe([add(1), add(10), add(100)]);
        assert_eq!(task.call(json!(0)).await.unwrap(), json!(111));
    }

    #[tokio::test]
    async fn failure_carrier_points_at_failing_stage() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task = pipe([add(1), failing_until(Arc::clone(&calls), 2, 10)]);

        let failure = task.call(json!(0)).await.unwrap_err();
        let carrier = failure.state.as_object().unwrap();
        assert_eq!(carrier["__runtime_step"], json!(1));
        assert_eq!(carrier["__runtime_count"], json!(2));
        assert_eq!(carrier["__runtime_data"], json!(1));
    }

    #[tokio::test]
    async fn resumes_from_failing_stage_after_round_trip() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let first_counter = Arc::clone(&first_calls);
        let first = task_fn(move |state| {
            first_counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let n = state.as_i64().unwrap_or_default();
                Ok(Value::from(n + 1))
            }
        });
        let second_calls = Arc::new(AtomicUsize::new(0));
        let second = failing_until(Arc::clone(&second_calls), 3, 10);

        let task = pipe([first, second]);
        let mut state = json!(0);
        let out = loop {
            match task.call(state).await {
                Ok(out) => break out,
                Err(failure) => {
                    // simulate a snapshot: dump and reload the carrier
                    let dumped = serde_json::to_string(&failure.state).unwrap();
                    state = serde_json::from_str(&dumped).unwrap();
                }
            }
        };

        assert_eq!(out, json!(11));
        // the first stage never re-ran after its success
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stage_count_mismatch_is_a_runtime_error() {
        let task = pipe([add(1), add(2)]);
        let stale = json!({"__runtime_step": 0, "__runtime_count": 3, "__runtime_data": 5});
        let failure = task.call(stale).await.unwrap_err();
        assert!(failure.error.is_runtime());
    }

    #[tokio::test]
    async fn out_of_range_step_is_a_runtime_error() {
        let task = pipe([add(1), add(2)]);
        let stale = json!({"__runtime_step": 2, "__runtime_count": 2, "__runtime_data": 5});
        let failure = task.call(stale).await.unwrap_err();
        assert!(failure.error.is_runtime());
    }
}
