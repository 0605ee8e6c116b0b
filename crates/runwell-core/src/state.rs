//! Task specifications, observable state, and callback types.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::options::RunOptions;
use crate::task::{ArcTask, Value};
use crate::Error;

/// Invoked after every attempt and once more at completion, with the state
/// snapshot and the attempt's error, if any.
pub type TaskCallback = Arc<dyn Fn(&TaskState, Option<&Error>) + Send + Sync>;

/// Invoked immediately before each scheduled retry wait, with the state
/// snapshot, the upcoming delay, and the error that caused the retry.
pub type RetryCallback = Arc<dyn Fn(&TaskState, Duration, Option<&Error>) + Send + Sync>;

/// Specification of a single unit of work: a name, a task function, the
/// initial state, and per-task options.
#[derive(Clone)]
pub struct TaskSpec {
    pub name: String,
    pub exec: ArcTask,
    pub args: Value,
    pub opts: RunOptions,
}

impl TaskSpec {
    /// Creates a spec with default options.
    pub fn new(name: impl Into<String>, exec: ArcTask, args: Value) -> Self {
        Self {
            name: name.into(),
            exec,
            args,
            opts: RunOptions::new(),
        }
    }

    /// Replaces the per-task options.
    pub fn options(mut self, opts: RunOptions) -> Self {
        self.opts = opts;
        self
    }
}

/// Observable, snapshot-safe state of a task.
///
/// Serializes to the wire snapshot: `name`, `finished`, `success`,
/// `executed_count`, `stateful`, `error`, and RFC3339 `created_at` /
/// `updated_at`. Dumping this record after any attempt and loading
/// `stateful` back as a task input resumes from the captured progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub name: String,
    pub finished: bool,
    pub success: bool,
    pub executed_count: u32,
    pub stateful: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    /// Fresh state for a task created at `t`, seeded with its initial args.
    pub fn new(name: impl Into<String>, args: Value, t: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            finished: false,
            success: false,
            executed_count: 0,
            stateful: args,
            error: String::new(),
            created_at: t,
            updated_at: t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_round_trips() {
        let state = TaskState::new("demo", json!([1, 2, 3]), Utc::now());
        let snapshot = serde_json::to_string(&state).unwrap();
        let loaded: TaskState = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.stateful, json!([1, 2, 3]));
        assert_eq!(loaded.executed_count, 0);
        assert_eq!(loaded.created_at, state.created_at);
        assert_eq!(loaded.updated_at, state.updated_at);
    }

    #[test]
    fn snapshot_uses_wire_keys() {
        let state = TaskState::new("demo", json!(1), Utc::now());
        let snapshot = serde_json::to_value(&state).unwrap();
        let object = snapshot.as_object().unwrap();
        for key in [
            "name",
            "finished",
            "success",
            "executed_count",
            "stateful",
            "created_at",
            "updated_at",
        ] {
            assert!(object.contains_key(key), "missing key: {key}");
        }
        assert_eq!(object.len(), 7);
        let created_at = object["created_at"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
    }

    #[test]
    fn empty_error_is_omitted() {
        let state = TaskState::new("demo", Value::Null, Utc::now());
        let snapshot = serde_json::to_value(&state).unwrap();
        assert!(snapshot.get("error").is_none());
    }
}
