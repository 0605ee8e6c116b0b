//! Split → map → reduce with injected failures, resumed across snapshots.
//!
//! Run with: `cargo run --example getting_started -p runwell`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use runwell::{
    map, pipe, run, wrap_task, Error, Failure, FixedBackoff, RunOptions, TaskState, Value,
};

fn flaky<T: serde::Serialize>(out: T) -> Result<T, Failure> {
    if rand::rng().random_range(0..100) < 50 {
        Err(Failure::retry(&out, Error::msg("injected error")))
    } else {
        Ok(out)
    }
}

#[tokio::main]
async fn main() {
    let task = pipe([
        wrap_task(|n: i64| {
            if rand::rng().random_range(0..100) < 50 {
                return Err(Failure::retry(n, Error::msg("split error")));
            }
            Ok((0..n).collect::<Vec<i64>>())
        }),
        map(wrap_task(|i: i64| flaky(i * 100))),
        wrap_task(|xs: Vec<i64>| {
            let sum: i64 = xs.iter().sum();
            flaky(sum)
        }),
    ]);

    // every attempt's state is dumped from the callback, exactly as a
    // durable caller would persist it to a file or database
    let mut snapshot: Option<String> = None;
    loop {
        let input = match &snapshot {
            None => Value::from(10),
            Some(dump) => {
                let state: TaskState = serde_json::from_str(dump).expect("valid snapshot");
                state.stateful
            }
        };

        let latest = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&latest);
        let opts = RunOptions::new()
            .retry_count(2)
            .backoff(FixedBackoff::new(Duration::from_millis(20)))
            .callback(move |state, _err| {
                let dump = serde_json::to_string(state).expect("serializable state");
                *sink.lock().unwrap() = Some(dump);
            });

        match run("getting-started", task.clone(), input, opts).await {
            Ok(out) => {
                println!("succeeded: {out}");
                assert_eq!(out, Value::from(4500));
                break;
            }
            Err(failure) => {
                println!("round failed ({}), resuming from snapshot", failure.error);
                snapshot = latest.lock().unwrap().clone();
            }
        }
    }
}
