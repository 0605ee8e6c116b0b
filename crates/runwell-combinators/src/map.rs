//! Data-parallel application of one task to every element of a collection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{from_value, Map};

use runwell_core::{ArcTask, BoxTaskFuture, Error, Failure, TaskFn, TaskOutput, Value};

use crate::{carrier_state, has_marker, MARKER_FAIL};

type JsonMap = Map<String, Value>;

/// Resumable map progress. The pending set is transient; the snapshot holds
/// the failed inputs and the success container (list for array-shaped
/// input, map for object-shaped input — exactly one of the two).
#[derive(Debug, Default, Serialize, Deserialize)]
struct MapState {
    #[serde(rename = "__runtime_fail", default)]
    fail: JsonMap,
    #[serde(rename = "__runtime_list", default, skip_serializing_if = "Option::is_none")]
    list: Option<Vec<Value>>,
    #[serde(rename = "__runtime_map", default, skip_serializing_if = "Option::is_none")]
    map: Option<JsonMap>,
    #[serde(skip)]
    run_list: JsonMap,
}

impl MapState {
    fn set_output(&mut self, key: &str, out: Value) -> Result<(), Error> {
        if let Some(list) = &mut self.list {
            let index: usize = key
                .parse()
                .map_err(|_| Error::runtime(format!("invalid element index: {key}")))?;
            if index >= list.len() {
                return Err(Error::runtime(format!(
                    "element index {index} out of range for {} results",
                    list.len()
                )));
            }
            list[index] = out;
        } else {
            self.map.get_or_insert_with(JsonMap::new).insert(key.to_string(), out);
        }
        Ok(())
    }

    fn into_output(self) -> Value {
        if let Some(list) = self.list {
            Value::Array(list)
        } else {
            Value::Object(self.map.unwrap_or_default())
        }
    }
}

/// Applies one task to every element of a list or map input, concurrently.
///
/// Array-shaped input yields an array of results in the same positions;
/// object-shaped input yields an object with the same keys. Null passes
/// through untouched; any other shape is a runtime error.
///
/// On partial failure the returned state keeps every success where it
/// landed and records each failed element's returned value under its key,
/// so the next attempt (before or after a snapshot round trip) re-runs only
/// the failures.
pub fn map(task: ArcTask) -> ArcTask {
    Arc::new(MapRunner { task })
}

struct MapRunner {
    task: ArcTask,
}

impl TaskFn for MapRunner {
    fn call(&self, state: Value) -> BoxTaskFuture {
        let task = Arc::clone(&self.task);
        Box::pin(run_map(task, state))
    }
}

async fn run_map(task: ArcTask, sin: Value) -> TaskOutput {
    if sin.is_null() {
        return Ok(sin);
    }
    let mut ctx = if has_marker(&sin, MARKER_FAIL) {
        let mut ctx: MapState = match from_value(sin.clone()) {
            Ok(ctx) => ctx,
            Err(err) => {
                return Err(Failure::new(
                    sin,
                    Error::runtime(format!("invalid map state: {err}")),
                ));
            }
        };
        if ctx.fail.is_empty() {
            return Ok(sin);
        }
        // failed elements become the pending set for this attempt
        ctx.run_list = std::mem::take(&mut ctx.fail);
        if ctx.list.is_none() && ctx.map.is_none() {
            ctx.map = Some(JsonMap::new());
        }
        ctx
    } else {
        let mut ctx = MapState::default();
        match sin {
            Value::Array(items) => {
                if items.is_empty() {
                    return Ok(Value::Array(items));
                }
                ctx.list = Some(vec![Value::Null; items.len()]);
                for (index, item) in items.into_iter().enumerate() {
                    ctx.run_list.insert(index.to_string(), item);
                }
            }
            Value::Object(entries) => {
                if entries.is_empty() {
                    return Ok(Value::Object(entries));
                }
                ctx.map = Some(JsonMap::new());
                ctx.run_list = entries;
            }
            other => {
                return Err(Failure::new(
                    other.clone(),
                    Error::runtime(format!(
                        "map input must be an array or object, got: {other}"
                    )),
                ));
            }
        }
        ctx
    };

    let mut workers = Vec::with_capacity(ctx.run_list.len());
    for (key, input) in std::mem::take(&mut ctx.run_list) {
        let task = Arc::clone(&task);
        let state = input.clone();
        workers.push((key, input, tokio::spawn(async move { task.call(state).await })));
    }

    let mut err_out: Option<Error> = None;
    for (key, input, worker) in workers {
        match worker.await {
            Ok(Ok(out)) => {
                if let Err(err) = ctx.set_output(&key, out) {
                    err_out = Some(Error::append(err_out, err));
                }
            }
            Ok(Err(failure)) => {
                ctx.fail.insert(key, failure.state);
                err_out = Some(Error::append(err_out, failure.error));
            }
            Err(join_err) => {
                // a panicked worker keeps its input so a retry could re-run
                // it, but the panic itself is terminal
                ctx.fail.insert(key, input);
                err_out = Some(Error::append(
                    err_out,
                    Error::runtime(format!("map worker died: {join_err}")),
                ));
            }
        }
    }

    match err_out {
        Some(err) => Err(Failure::new(carrier_state(&ctx), err)),
        None => Ok(ctx.into_output()),
    }
}
