//! A fixed-size pool of worker threads.

use std::future::Future;
use std::io;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use crossbeam_queue::SegQueue;
use futures::channel::oneshot;
use futures::executor;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// The errors a `WorkerPool` can return.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was asked to start with no threads.
    #[error("a worker pool needs at least one thread")]
    NoWorkers,
    /// A worker thread could not be started.
    #[error("failed to spawn a worker thread")]
    Spawn(#[from] io::Error),
    /// A task was submitted after the pool was shut down.
    #[error("the worker pool has been shut down")]
    ShutDown,
    /// The task panicked, so no result was produced.
    #[error("the task did not produce a result")]
    Cancelled,
}

struct Shared {
    queue: SegQueue<Task>,
    shutdown: Mutex<bool>,
    available: Condvar,
    running: AtomicUsize,
}

impl Shared {
    fn run(&self) {
        loop {
            // Counted as running before the pop, so a dequeued task is never
            // invisible to `is_idle`.
            self.running.fetch_add(1, Ordering::AcqRel);
            let task = self.queue.pop();
            let ran = task.is_some();
            if let Some(task) = task {
                task();
            }
            self.running.fetch_sub(1, Ordering::AcqRel);
            if ran {
                continue;
            }

            let mut shutdown = self.shutdown.lock();
            if !self.queue.is_empty() {
                continue;
            }
            if *shutdown {
                return;
            }
            self.available.wait(&mut shutdown);
        }
    }
}

/// A pool of threads which run submitted tasks in the order they arrive.
///
/// Dropping the pool shuts it down, which waits for every queued task.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start a pool with `threads` workers.
    pub fn new(threads: usize) -> Result<WorkerPool, PoolError> {
        if threads == 0 {
            return Err(PoolError::NoWorkers);
        }

        let shared = Arc::new(Shared {
            queue: SegQueue::new(),
            shutdown: Mutex::new(false),
            available: Condvar::new(),
            running: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_shared = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("blockecs-worker-{}", index))
                .spawn(move || worker_shared.run());

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // Dropping the partial pool joins the threads already started.
                    drop(WorkerPool { shared, workers });
                    return Err(err.into());
                }
            }
        }

        debug!(threads, "started worker pool");
        Ok(WorkerPool { shared, workers })
    }

    /// Start a pool with one worker per available CPU.
    pub fn with_available_parallelism() -> Result<WorkerPool, PoolError> {
        let threads = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        WorkerPool::new(threads)
    }

    /// Get the number of worker threads still attached to this pool.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue `f` to run on a worker thread.
    ///
    /// The returned handle resolves to the task's result.
    pub fn execute<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
        where F: FnOnce() -> R + Send + 'static,
              R: Send + 'static
    {
        let (tx, rx) = oneshot::channel();
        let task: Task = Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(result) => {
                    // The caller may have dropped the handle.
                    let _ = tx.send(result);
                }
                Err(_) => warn!("worker pool task panicked"),
            }
        });

        {
            let shutdown = self.shared.shutdown.lock();
            if *shutdown {
                return Err(PoolError::ShutDown);
            }
            self.shared.queue.push(task);
        }

        self.shared.available.notify_one();
        Ok(TaskHandle { rx })
    }

    /// Returns true if no task is queued or running.
    pub fn is_idle(&self) -> bool {
        self.shared.queue.is_empty() && self.shared.running.load(Ordering::Acquire) == 0
    }

    /// Stop accepting tasks, run everything already queued and join every
    /// worker.
    pub fn shutdown(&mut self) {
        *self.shared.shutdown.lock() = true;
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A handle to the result of a task queued on a `WorkerPool`.
///
/// The handle is a `Future`, and can also be waited on synchronously.
pub struct TaskHandle<R> {
    rx: oneshot::Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Block the current thread until the task has finished.
    pub fn wait(self) -> Result<R, PoolError> {
        executor::block_on(self)
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| PoolError::Cancelled))
    }
}
