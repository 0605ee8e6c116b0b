//! The postman: a single-consumer batching event pump.
//!
//! Posts are buffered under a short lock and delivered by one background
//! task as ordered batches, so a burst of posts coalesces into a single
//! consumer call. Batches preserve insertion order and are delivered
//! serially.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Consumes the batches drained from a postman's buffer.
pub type Consumer<T> = Box<dyn Fn(&[T]) + Send + Sync>;

/// Single-consumer coalescing pump.
pub struct Postman<T> {
    shared: Arc<Shared<T>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

struct Shared<T> {
    buffer: Mutex<Buffer<T>>,
    recv_tx: mpsc::Sender<()>,
    stop_tx: mpsc::Sender<()>,
}

struct Buffer<T> {
    list: Vec<T>,
    closed: bool,
}

impl<T: Send + 'static> Postman<T> {
    /// Starts a postman delivering to the given consumers. Every consumer
    /// sees every batch.
    pub fn new(consumers: Vec<Consumer<T>>) -> Self {
        let (recv_tx, recv_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            buffer: Mutex::new(Buffer {
                list: Vec::new(),
                closed: false,
            }),
            recv_tx,
            stop_tx,
        });
        let worker = tokio::spawn(run_loop(Arc::clone(&shared), consumers, recv_rx, stop_rx));
        Self {
            shared,
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Starts a postman with a single consumer.
    pub fn single(consumer: impl Fn(&[T]) + Send + Sync + 'static) -> Self {
        Self::new(vec![Box::new(consumer)])
    }

    /// Enqueues one element. Non-blocking apart from the brief buffer lock;
    /// a post after [`close`](Self::close) is dropped with an error log.
    pub fn post(&self, t: T) {
        {
            let mut buffer = self.shared.lock_buffer();
            if buffer.closed {
                tracing::error!("post after close");
                return;
            }
            buffer.list.push(t);
        }
        let _ = self.shared.recv_tx.try_send(());
    }

    /// Delivers everything still buffered, then stops the delivery task.
    /// A second close is a no-op.
    pub async fn close(&self) {
        {
            let mut buffer = self.shared.lock_buffer();
            if buffer.closed {
                return;
            }
            buffer.closed = true;
        }
        let _ = self.shared.stop_tx.try_send(());
        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.await;
        }
    }
}

impl<T> Shared<T> {
    fn lock_buffer(&self) -> MutexGuard<'_, Buffer<T>> {
        self.buffer.lock().expect("postman buffer poisoned")
    }

    fn fetch(&self) -> Vec<T> {
        std::mem::take(&mut self.lock_buffer().list)
    }
}

async fn run_loop<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    consumers: Vec<Consumer<T>>,
    mut recv_rx: mpsc::Receiver<()>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = recv_rx.recv() => deliver(&shared, &consumers),
            _ = stop_rx.recv() => {
                deliver(&shared, &consumers);
                return;
            }
        }
    }
}

fn deliver<T>(shared: &Shared<T>, consumers: &[Consumer<T>]) {
    let batch = shared.fetch();
    if batch.is_empty() || consumers.is_empty() {
        return;
    }
    for consumer in consumers {
        consumer(&batch);
    }
}
