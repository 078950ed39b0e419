//! Render worker pool.
//!
//! A fixed set of named threads pulling jobs from a shared `flume` queue.
//! Workers exit when the pool is shut down or every sender is dropped.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error};

/// Callback invoked by a worker for every job it receives.
pub type JobExecutor<J> = Arc<dyn Fn(J) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("worker pool has shut down")]
pub struct PoolClosed;

/// Configuration for the render worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn. Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Maximum time a worker waits for a job before re-checking shutdown.
    /// Default: 100ms.
    pub poll_interval: Duration,

    /// Thread names are `{thread_name}-{id}`.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(num_cpus())
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            poll_interval: Duration::from_millis(100),
            thread_name: "pageview-render".to_owned(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Pool of worker threads executing jobs of type `J`.
///
/// Jobs are handed out in submission order; with one worker they also run
/// in that order.
///
/// # Example
///
/// ```
/// use pageview_scheduler::{JobExecutor, WorkerPool, WorkerPoolConfig};
/// use std::sync::Arc;
///
/// let (done_tx, done_rx) = flume::unbounded();
/// let executor: JobExecutor<usize> = Arc::new(move |page: usize| {
///     let _ = done_tx.send(page * 2);
/// });
///
/// let pool = WorkerPool::new(executor, WorkerPoolConfig::new(2)).unwrap();
/// pool.submit(21).unwrap();
/// assert_eq!(done_rx.recv().unwrap(), 42);
///
/// pool.shutdown();
/// ```
pub struct WorkerPool<J: Send + 'static> {
    sender: Sender<J>,
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Create and start a new worker pool.
    pub fn new(executor: JobExecutor<J>, config: WorkerPoolConfig) -> io::Result<Self> {
        let (sender, receiver) = flume::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers.max(1) {
            let worker = Worker::spawn(
                format!("{}-{id}", config.thread_name),
                receiver.clone(),
                executor.clone(),
                shutdown.clone(),
                config.poll_interval,
            );
            match worker {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    shutdown.store(true, Ordering::Release);
                    return Err(err);
                }
            }
        }

        debug!("started {} {} workers", workers.len(), config.thread_name);
        Ok(Self { sender, workers, shutdown })
    }

    /// Queue a job for the next free worker.
    pub fn submit(&self, job: J) -> Result<(), PoolClosed> {
        if self.is_shutting_down() {
            return Err(PoolClosed);
        }
        self.sender.send(job).map_err(|_| PoolClosed)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Jobs submitted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Signal shutdown and wait for every worker to finish its current job.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in std::mem::take(&mut self.workers) {
            worker.join();
        }
    }

    /// Signal shutdown without waiting; workers exit after their current job.
    pub fn shutdown_nowait(self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl<J: Send + 'static> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// A single worker thread in the pool.
struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<J: Send + 'static>(
        name: String,
        receiver: Receiver<J>,
        executor: JobExecutor<J>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || Self::run(receiver, executor, shutdown, poll_interval))?;

        Ok(Self { thread: Some(thread) })
    }

    /// Pull jobs until shutdown is signalled or the queue disconnects.
    fn run<J>(
        receiver: Receiver<J>,
        executor: JobExecutor<J>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        while !shutdown.load(Ordering::Acquire) {
            match receiver.recv_timeout(poll_interval) {
                Ok(job) => executor(job),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let name = thread.thread().name().unwrap_or("worker").to_owned();
            if thread.join().is_err() {
                error!("{name} panicked");
            }
        }
    }
}

/// Number of logical CPU cores, used as the default worker count.
pub fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
