//! Task queues and their drain barriers.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use runwell_core::TaskRunner;

/// Count-down barrier: `wait` completes once `done` has been called as many
/// times as the initial count. Extra `done` calls saturate at zero.
pub(crate) struct WaitGroup {
    count: Mutex<usize>,
    notify: Notify,
}

impl WaitGroup {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            notify: Notify::new(),
        }
    }

    pub(crate) fn done(&self) {
        let mut count = self.count.lock().expect("wait group poisoned");
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.notify.notify_waiters();
        }
    }

    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking, so a final `done` between the check
            // and the await cannot be missed
            notified.as_mut().enable();
            if *self.count.lock().expect("wait group poisoned") == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One side of the executor: the tasks it currently holds, plus the drain
/// barriers registered by cleanup/close. Removing a task (or discarding one
/// via skip-prev) decrements every outstanding barrier.
#[derive(Default)]
pub(crate) struct TaskQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    tasks: Vec<Arc<TaskRunner>>,
    waiters: Vec<Arc<WaitGroup>>,
}

impl TaskQueue {
    pub(crate) fn add(&self, runner: Arc<TaskRunner>) {
        let mut inner = self.lock();
        if !inner.waiters.is_empty() {
            // cleanup write-locks out new submissions, so a task arriving
            // while a drain barrier is registered is a bug in the caller
            tracing::error!(
                queue = runner.queue(),
                task = runner.name(),
                waiters = inner.waiters.len(),
                "task added while queue is draining"
            );
            debug_assert!(inner.waiters.is_empty(), "task added while queue is draining");
        }
        inner.tasks.push(runner);
    }

    /// Snapshots the dispatchable tasks, applying skip-prev: the most recent
    /// task flagged `skip_prev` discards everything queued before it. Each
    /// discarded task decrements every outstanding barrier and is never
    /// dispatched.
    pub(crate) fn ready_tasks(&self) -> Vec<Arc<TaskRunner>> {
        let mut inner = self.lock();
        let mut newest_skip = inner.tasks.len() as isize - 1;
        while newest_skip >= 0 {
            if inner.tasks[newest_skip as usize].options().is_skip_prev() {
                break;
            }
            newest_skip -= 1;
        }
        if newest_skip < 1 {
            return inner.tasks.clone();
        }
        let discarded = newest_skip as usize;
        for waiter in &inner.waiters {
            for _ in 0..discarded {
                waiter.done();
            }
        }
        inner.tasks.drain(..discarded);
        inner.tasks.clone()
    }

    pub(crate) fn remove(&self, runner: &Arc<TaskRunner>) {
        let mut inner = self.lock();
        if let Some(index) = inner
            .tasks
            .iter()
            .position(|task| Arc::ptr_eq(task, runner))
        {
            inner.tasks.remove(index);
        }
        for waiter in &inner.waiters {
            waiter.done();
        }
    }

    pub(crate) fn fast_fail_all(&self) {
        let inner = self.lock();
        for task in &inner.tasks {
            task.fast_fail();
        }
    }

    /// Blocks until every task currently in the queue has been removed.
    pub(crate) async fn drain(&self) {
        let waiter = {
            let mut inner = self.lock();
            if inner.tasks.is_empty() {
                return;
            }
            let waiter = Arc::new(WaitGroup::new(inner.tasks.len()));
            inner.waiters.push(Arc::clone(&waiter));
            waiter
        };
        waiter.wait().await;
        let mut inner = self.lock();
        inner
            .waiters
            .retain(|candidate| !Arc::ptr_eq(candidate, &waiter));
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().expect("task queue poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwell_core::{task_fn, RunOptions, TaskSpec};
    use serde_json::json;

    fn runner(name: &str, skip_prev: bool) -> Arc<TaskRunner> {
        let spec = TaskSpec::new(name, task_fn(|state| async move { Ok(state) }), json!(0));
        Arc::new(TaskRunner::new(
            "test",
            spec,
            RunOptions::new().skip_prev(skip_prev),
        ))
    }

    #[tokio::test]
    async fn skip_prev_discards_older_waiting_tasks() {
        // (flags, expected remaining tail)
        let cases: Vec<(Vec<bool>, usize)> = vec![
            (vec![false, false, false, false], 4),
            (vec![true, false, false, false], 4),
            (vec![true, true, false, false], 3),
            (vec![false, true, false, false], 3),
            (vec![false, true, true, false], 2),
            (vec![false, true, true, true], 1),
            (vec![true, true, true, true], 1),
        ];
        for (flags, expect) in cases {
            let queue = TaskQueue::default();
            for (i, flag) in flags.iter().enumerate() {
                queue.add(runner(&i.to_string(), *flag));
            }
            let discarded = flags.len() - expect;
            let waiter = Arc::new(WaitGroup::new(discarded));
            queue.lock().waiters.push(Arc::clone(&waiter));

            let ready = queue.ready_tasks();
            // every discarded task decremented the barrier
            waiter.wait().await;

            let names: Vec<String> = ready.iter().map(|t| t.name().to_string()).collect();
            assert_eq!(names.len(), expect, "flags: {flags:?}");
            let offset = flags.len() - expect;
            for (i, name) in names.iter().enumerate() {
                assert_eq!(name, &(offset + i).to_string(), "flags: {flags:?}");
            }
        }
    }

    #[tokio::test]
    async fn drain_completes_after_all_removals() {
        let queue = Arc::new(TaskQueue::default());
        let first = runner("a", false);
        let second = runner("b", false);
        queue.add(Arc::clone(&first));
        queue.add(Arc::clone(&second));

        let drainer = Arc::clone(&queue);
        let handle = tokio::spawn(async move { drainer.drain().await });

        tokio::task::yield_now().await;
        queue.remove(&first);
        queue.remove(&second);
        handle.await.unwrap();
        assert!(queue.lock().waiters.is_empty());
    }

    #[tokio::test]
    async fn drain_of_empty_queue_returns_immediately() {
        let queue = TaskQueue::default();
        queue.drain().await;
    }

    #[tokio::test]
    async fn extra_done_calls_saturate() {
        let group = WaitGroup::new(1);
        group.done();
        group.done();
        group.wait().await;
    }
}
