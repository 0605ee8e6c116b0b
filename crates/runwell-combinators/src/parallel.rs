//! Task-parallel application of several tasks to one input.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::from_value;

use runwell_core::{identity, ArcTask, BoxTaskFuture, Error, Failure, TaskFn, TaskOutput, Value};

use crate::{carrier_state, has_marker, MARKER_FAIL};

/// Resumable parallel progress: per-task results sized to the task count,
/// plus the indices that failed and must be re-run. The pending set is
/// transient.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ParallelState {
    #[serde(rename = "__runtime_succeed", default)]
    succeed: Vec<Value>,
    #[serde(rename = "__runtime_fail", default)]
    fail: Vec<usize>,
    #[serde(skip)]
    run_list: Vec<(usize, Value)>,
}

/// Runs every task on the same input, concurrently.
///
/// On full success the output is the list of per-task results, in task
/// order. On partial failure the returned state stores each task's latest
/// value — the failing tasks' returned states included — and the failing
/// indices, so the next attempt re-runs only those, each resuming from its
/// own last value.
///
/// An empty task list is the identity task.
pub fn parallel(tasks: impl IntoIterator<Item = ArcTask>) -> ArcTask {
    let tasks: Vec<ArcTask> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return identity();
    }
    Arc::new(ParallelRunner {
        tasks: Arc::from(tasks),
    })
}

struct ParallelRunner {
    tasks: Arc<[ArcTask]>,
}

impl TaskFn for ParallelRunner {
    fn call(&self, state: Value) -> BoxTaskFuture {
        let tasks = Arc::clone(&self.tasks);
        Box::pin(run_parallel(tasks, state))
    }
}

async fn run_parallel(tasks: Arc<[ArcTask]>, sin: Value) -> TaskOutput {
    let count = tasks.len();
    let mut ctx = if has_marker(&sin, MARKER_FAIL) {
        let mut ctx: ParallelState = match from_value(sin.clone()) {
            Ok(ctx) => ctx,
            Err(err) => {
                return Err(Failure::new(
                    sin,
                    Error::runtime(format!("invalid parallel state: {err}")),
                ));
            }
        };
        if ctx.fail.is_empty() {
            return Ok(sin);
        }
        if ctx.succeed.is_empty() {
            return Err(Failure::new(
                sin,
                Error::runtime("cannot resume a parallel task without a prior attempt"),
            ));
        }
        for &index in &ctx.fail {
            if index >= ctx.succeed.len() || index >= count {
                return Err(Failure::new(
                    sin,
                    Error::runtime(format!(
                        "failed index {index} out of range for {} results and {count} tasks",
                        ctx.succeed.len()
                    )),
                ));
            }
        }
        ctx.run_list = ctx
            .fail
            .iter()
            .map(|&index| (index, ctx.succeed[index].clone()))
            .collect();
        ctx.fail.clear();
        ctx
    } else {
        ParallelState {
            succeed: vec![Value::Null; count],
            fail: Vec::new(),
            run_list: (0..count).map(|index| (index, sin.clone())).collect(),
        }
    };

    let mut workers = Vec::with_capacity(ctx.run_list.len());
    for (index, input) in std::mem::take(&mut ctx.run_list) {
        let task = Arc::clone(&tasks[index]);
        let state = input.clone();
        workers.push((
            index,
            input,
            tokio::spawn(async move { task.call(state).await }),
        ));
    }

    let mut err_out: Option<Error> = None;
    for (index, input, worker) in workers {
        match worker.await {
            Ok(Ok(out)) => {
                ctx.succeed[index] = out;
            }
            Ok(Err(failure)) => {
                // the failing value is saved too, so the retry re-feeds it
                ctx.succeed[index] = failure.state;
                ctx.fail.push(index);
                err_out = Some(Error::append(err_out, failure.error));
            }
            Err(join_err) => {
                ctx.succeed[index] = input;
                ctx.fail.push(index);
                err_out = Some(Error::append(
                    err_out,
                    Error::runtime(format!("parallel worker died: {join_err}")),
                ));
            }
        }
    }

    match err_out {
        Some(err) => Err(Failure::new(carrier_state(&ctx), err)),
        None => Ok(Value::Array(ctx.succeed)),
    }
}
