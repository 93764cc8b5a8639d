//! Fixed-size thread pool for blocking calendar calls.
//!
//! Jobs go through a channel to dedicated OS threads; each caller awaits a
//! oneshot carrying the job's result. A job that panics is reported to its
//! caller and leaves the worker alive. Dropping the pool detaches the
//! workers; `shutdown` waits for them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::BookingError;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub const DEFAULT_SIZE: usize = 5;

    /// Start `size` worker threads (at least one).
    pub fn new(size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("roombook-worker-{}", index))
                .spawn(move || loop {
                    let job = receiver.lock().recv();
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })?;
            workers.push(handle);
        }
        tracing::debug!("Started worker pool with {} threads", size);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    pub fn with_default_size() -> std::io::Result<Self> {
        Self::new(Self::DEFAULT_SIZE)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` on a worker thread and wait for its result without blocking
    /// the caller. Jobs queue when every worker is busy.
    pub async fn run<F, T>(&self, f: F) -> Result<T, BookingError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            // The caller may have stopped waiting.
            let _ = tx.send(result);
        });

        self.submit(job)?;

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => {
                tracing::error!("Worker job panicked");
                Err(BookingError::WorkerPanicked)
            }
            Err(_) => Err(BookingError::WorkerPoolClosed),
        }
    }

    fn submit(&self, job: Job) -> Result<(), BookingError> {
        let sender = self.sender.lock();
        sender
            .as_ref()
            .ok_or(BookingError::WorkerPoolClosed)?
            .send(job)
            .map_err(|_| BookingError::WorkerPoolClosed)
    }

    /// Stop accepting jobs, let queued jobs finish, and join the workers.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("Worker thread exited abnormally");
            }
        }
        tracing::debug!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    /// Closes the queue without joining: workers finish what is queued and
    /// exit on their own.
    fn drop(&mut self) {
        self.sender.get_mut().take();
    }
}
