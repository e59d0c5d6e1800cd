//! FIFO task queue drained by a fixed pool of workers.
//!
//! Producers never block. Idle workers park on a [`Notify`] and are woken
//! one per enqueued task. Closing the queue refuses new work; workers keep
//! draining what was already accepted and exit once it is empty.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cortex_sdk::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const DEFAULT_WORKERS: u16 = 6;

/// One unit of work submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub raw: String,
}

#[derive(Default)]
pub struct TaskQueue {
    pending: Mutex<VecDeque<Task>>,
    ready: Notify,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task and wake one idle worker. Returns the task id.
    pub fn enqueue(&self, raw: impl Into<String>) -> Result<u64> {
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Shutdown("task queue".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        pending.push_back(Task { id, raw: raw.into() });
        drop(pending);

        self.ready.notify_one();
        tracing::debug!(task = id, "Task enqueued");
        Ok(id)
    }

    pub fn try_dequeue(&self) -> Option<Task> {
        self.pending.lock().pop_front()
    }

    /// Wait for the next task. Returns `None` once the queue is closed and
    /// empty.
    pub async fn dequeue(&self) -> Option<Task> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Register before checking so a wake-up between the check and
            // the await is not lost.
            notified.as_mut().enable();

            if let Some(task) = self.try_dequeue() {
                return Some(task);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Stop accepting tasks and wake every idle worker.
    pub fn close(&self) {
        {
            let _pending = self.pending.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// What a worker does with a task. The returned text is the task's
/// outcome; failures are expected to be folded into it.
pub trait TaskProcessor: Send + Sync + 'static {
    fn process(&self, task: Task) -> impl Future<Output = String> + Send;
}

/// Fixed set of worker tasks sharing one queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<P: TaskProcessor>(queue: Arc<TaskQueue>, processor: Arc<P>, size: usize) -> Self {
        let workers = (0..size.max(1))
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&queue), Arc::clone(&processor))))
            .collect::<Vec<_>>();
        tracing::info!(workers = workers.len(), "Worker pool started");
        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit. Workers only exit after the queue is
    /// closed and drained.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop<P: TaskProcessor>(worker: usize, queue: Arc<TaskQueue>, processor: Arc<P>) {
    while let Some(task) = queue.dequeue().await {
        let id = task.id;
        let processor = Arc::clone(&processor);
        // A panicking task must not take the worker with it.
        match tokio::spawn(async move { processor.process(task).await }).await {
            Ok(outcome) => tracing::debug!(worker, task = id, %outcome, "Task processed"),
            Err(e) => tracing::error!(worker, task = id, error = %e, "Task processing panicked"),
        }
    }
    tracing::debug!(worker, "Worker exiting");
}
