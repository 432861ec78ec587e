//! Single-thread FIFO job queue.
//!
//! Classification and punching block on socket timeouts, so callers hand them
//! to a [`JobQueue`]:
//! - One dedicated worker thread, jobs run strictly in submission order
//! - Unbounded channel, submission never blocks
//! - A panicking job is logged and does not take the worker down
//! - Dropping the queue runs every job already submitted, then joins

use crate::error::QueueError;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Work item for the worker thread
enum Task {
    /// Run a job
    Run(Job),
    /// Stop after the jobs queued before this one
    Shutdown,
}

/// Queue statistics
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Jobs accepted by `submit`
    pub submitted: AtomicU64,
    /// Jobs that ran to completion
    pub completed: AtomicU64,
    /// Jobs that panicked
    pub panicked: AtomicU64,
}

impl QueueStats {
    /// Jobs accepted but not yet finished
    pub fn pending(&self) -> u64 {
        let finished =
            self.completed.load(Ordering::Relaxed) + self.panicked.load(Ordering::Relaxed);
        self.submitted.load(Ordering::Relaxed).saturating_sub(finished)
    }
}

/// Background job queue with a single worker thread
pub struct JobQueue {
    name: String,
    task_tx: Sender<Task>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<QueueStats>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl JobQueue {
    /// Spawn the worker thread
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (task_tx, task_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(QueueStats::default());

        let worker = {
            let name = name.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(&name, &task_rx, &stats))?
        };
        let worker_id = worker.thread().id();

        info!("Started job queue {}", name);
        Ok(Self {
            name,
            task_tx,
            shutdown,
            stats,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Queue a job
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ShuttingDown`] once shutdown has begun.
    pub fn submit<F>(&self, job: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(QueueError::ShuttingDown);
        }

        self.task_tx
            .send(Task::Run(Box::new(job)))
            .map_err(|_| QueueError::ShuttingDown)?;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queue a job and get a handle to its result
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ShuttingDown`] once shutdown has begun.
    pub fn submit_with_result<T, F>(&self, job: F) -> Result<JobHandle<T>, QueueError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.submit(move || {
            // Receiver may have been dropped; the job still ran
            let _ = result_tx.send(job());
        })?;
        Ok(JobHandle { result_rx })
    }

    /// Queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Worker thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the caller is running on this queue's worker thread
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Run all queued jobs, then stop the worker
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        debug!("Shutting down job queue {}", self.name);
        self.shutdown.store(true, Ordering::Release);
        let _ = self.task_tx.send(Task::Shutdown);

        // Joining from inside a job would wait on ourselves
        if self.is_worker_thread() {
            warn!("Job queue {} dropped on its own worker thread", self.name);
            return;
        }

        if let Err(e) = worker.join() {
            error!("Job queue {} worker failed to join: {:?}", self.name, e);
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.name)
            .field("pending", &self.stats.pending())
            .finish_non_exhaustive()
    }
}

fn run_worker(name: &str, task_rx: &Receiver<Task>, stats: &QueueStats) {
    debug!("Worker {} starting", name);

    while let Ok(task) = task_rx.recv() {
        match task {
            Task::Run(job) => match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(()) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    stats.panicked.fetch_add(1, Ordering::Relaxed);
                    error!("Job on {} panicked", name);
                }
            },
            Task::Shutdown => {
                debug!("Worker {} received shutdown signal", name);
                break;
            }
        }
    }

    info!(
        "Worker {} shutting down (completed {} jobs, {} panicked)",
        name,
        stats.completed.load(Ordering::Relaxed),
        stats.panicked.load(Ordering::Relaxed)
    );
}

/// Result of a queued job
///
/// Resolves to [`QueueError::Canceled`] if the job panicked or the queue was
/// torn down before running it.
#[derive(Debug)]
pub struct JobHandle<T> {
    result_rx: oneshot::Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Block the current thread until the job finishes
    ///
    /// Must not be called from inside an async runtime; use
    /// [`join`](Self::join) there.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Canceled`] if the job never produced a result.
    pub fn wait(self) -> Result<T, QueueError> {
        self.result_rx
            .blocking_recv()
            .map_err(|_| QueueError::Canceled)
    }

    /// Wait for the job asynchronously
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Canceled`] if the job never produced a result.
    pub async fn join(self) -> Result<T, QueueError> {
        self.result_rx.await.map_err(|_| QueueError::Canceled)
    }

    /// Take the result if the job has finished
    pub fn try_result(&mut self) -> Option<Result<T, QueueError>> {
        match self.result_rx.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(QueueError::Canceled)),
        }
    }
}
