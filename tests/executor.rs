//! Executor scenarios: ordering, skip-prev, retry bounds, close semantics.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use runwell::{task_fn, Error, Failure, FixedBackoff, QueuedExecutor, RunOptions};
use serde_json::json;

fn identity_task() -> runwell::ArcTask {
    task_fn(|state| async move { Ok(state) })
}

async fn check_submission_order(executor: QueuedExecutor, n: i64, sum: Arc<AtomicI64>) {
    for i in 0..n {
        executor
            .submit("ordered", identity_task(), json!(i), RunOptions::new())
            .await;
    }
    executor.close().await;
    assert_eq!(sum.load(Ordering::SeqCst), n * (n - 1) / 2);
}

fn ordering_callback(prev: Arc<AtomicI64>, sum: Arc<AtomicI64>) -> RunOptions {
    RunOptions::new().cleanup(true).callback(move |state, _err| {
        let value = state.stateful.as_i64().unwrap_or_default();
        let last = prev.swap(value, Ordering::SeqCst);
        assert!(value > last, "saw {last} before {value}");
        sum.fetch_add(value, Ordering::SeqCst);
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cleanup_serializes_completions_in_submit_order() {
    let prev = Arc::new(AtomicI64::new(-1));
    let sum = Arc::new(AtomicI64::new(0));
    let executor = QueuedExecutor::new(
        "ordering",
        ordering_callback(Arc::clone(&prev), Arc::clone(&sum)),
    );
    check_submission_order(executor, 1000, sum).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cleanup_with_run_once_keeps_order_too() {
    let prev = Arc::new(AtomicI64::new(-1));
    let sum = Arc::new(AtomicI64::new(0));
    let executor = QueuedExecutor::new(
        "ordering",
        ordering_callback(Arc::clone(&prev), Arc::clone(&sum)).run_once(true),
    );
    check_submission_order(executor, 1000, sum).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn without_policies_every_submission_still_runs() {
    let sum = Arc::new(AtomicI64::new(0));
    let total = Arc::clone(&sum);
    let executor = QueuedExecutor::new(
        "parallel",
        RunOptions::new().callback(move |state, _err| {
            total.fetch_add(state.stateful.as_i64().unwrap_or_default(), Ordering::SeqCst);
        }),
    );

    let n: i64 = 10_000;
    for i in 0..n {
        executor
            .submit("free", identity_task(), json!(i), RunOptions::new())
            .await;
    }
    executor.close().await;
    assert_eq!(sum.load(Ordering::SeqCst), n * (n - 1) / 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn skip_prev_abandons_older_waiting_submissions() {
    let sum = Arc::new(AtomicI64::new(0));
    let observed = Arc::new(AtomicI64::new(0));
    let total = Arc::clone(&sum);
    let count = Arc::clone(&observed);
    let executor = QueuedExecutor::new(
        "latest-wins",
        RunOptions::new()
            .skip_prev(true)
            .run_once(true)
            .callback(move |state, _err| {
                total.fetch_add(state.stateful.as_i64().unwrap_or_default(), Ordering::SeqCst);
                count.fetch_add(1, Ordering::SeqCst);
            }),
    );

    // a task slow enough that the waiting queue backs up behind dispatch
    let dawdle = task_fn(|state| async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(state)
    });

    let n: i64 = 1000;
    let expect: i64 = n * (n - 1) / 2;
    for i in 0..n {
        executor
            .submit("latest", Arc::clone(&dawdle), json!(i), RunOptions::new())
            .await;
    }
    executor.close().await;

    // some earlier submissions were discarded before ever running
    assert!(sum.load(Ordering::SeqCst) < expect);
    assert!(observed.load(Ordering::SeqCst) < n);
    assert!(observed.load(Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_count_bounds_attempts_through_the_executor() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let executor = QueuedExecutor::new("bounded", RunOptions::new().cleanup(true));

    executor
        .submit(
            "hopeless",
            task_fn(move |state| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(Failure::new(state, Error::msg("never works"))) }
            }),
            json!(0),
            RunOptions::new()
                .retry_count(3)
                .backoff(FixedBackoff::new(Duration::from_millis(1))),
        )
        .await;
    executor.close().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_call_options_override_executor_defaults() {
    let finished = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));
    let done = Arc::clone(&finished);
    let counter = Arc::clone(&attempts);
    let executor = QueuedExecutor::new(
        "layered",
        RunOptions::new()
            .cleanup(true)
            .retry_count(10)
            .backoff(FixedBackoff::new(Duration::from_millis(1)))
            .callback(move |state, _err| {
                if state.finished {
                    done.fetch_add(1, Ordering::SeqCst);
                }
            }),
    );

    executor
        .submit(
            "strict",
            task_fn(move |state| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(Failure::new(state, Error::msg("still failing"))) }
            }),
            json!(0),
            RunOptions::new().retry_count(1),
        )
        .await;
    executor.close().await;

    // the call-site retry bound won over the executor default
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_is_idempotent_and_does_not_deadlock() {
    let executor = QueuedExecutor::new("twice", RunOptions::new());
    for i in 0..100 {
        executor
            .submit("work", identity_task(), json!(i), RunOptions::new())
            .await;
    }
    executor.close().await;
    executor.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn expiration_stops_retries_after_the_deadline() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let executor = QueuedExecutor::new("deadline", RunOptions::new().cleanup(true));

    let started = std::time::Instant::now();
    executor
        .submit(
            "expiring",
            task_fn(move |state| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(Failure::new(state, Error::msg("flaky forever"))) }
            }),
            json!(0),
            RunOptions::new()
                .expiration(Duration::from_millis(200))
                .backoff(FixedBackoff::new(Duration::from_millis(20))),
        )
        .await;
    executor.close().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    // retried well past the no-expiration bound of one attempt
    assert!(attempts.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_callbacks_announce_waits() {
    let announced = Arc::new(AtomicUsize::new(0));
    let waits = Arc::clone(&announced);
    let executor = QueuedExecutor::new("announce", RunOptions::new().cleanup(true));

    executor
        .submit(
            "waiter",
            task_fn(|state| async move {
                let n = state.as_i64().unwrap_or_default();
                if n < 2 {
                    Err(Failure::retry(n + 1, Error::msg("not yet")))
                } else {
                    Ok(state)
                }
            }),
            json!(0),
            RunOptions::new()
                .retry_count(5)
                .backoff(FixedBackoff::new(Duration::from_millis(1)))
                .retry_callback(move |_state, delay, err| {
                    assert!(!delay.is_zero());
                    assert!(err.is_some());
                    waits.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await;
    executor.close().await;

    assert_eq!(announced.load(Ordering::SeqCst), 2);
}
