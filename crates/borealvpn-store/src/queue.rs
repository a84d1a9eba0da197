//! Serialized background task queue
//!
//! A single worker thread draining a FIFO channel. Every secure-store
//! mutation, key-push pipeline and configuration merge goes through one
//! instance of this queue, so two configuration writes can never
//! interleave and a read-modify-write on the stored configuration is
//! race-free by construction.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO queue of jobs executed on one dedicated worker thread
pub struct TaskQueue {
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl TaskQueue {
    /// Spawn the worker thread. `name` labels the thread for diagnostics.
    pub fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .ok();

        if worker.is_none() {
            tracing::error!("Failed to spawn task queue worker {:?}", name);
        }

        Self {
            sender: Some(sender),
            worker,
        }
    }

    /// Enqueue a fire-and-forget job
    pub fn spawn<F: FnOnce() + Send + 'static>(&self, job: F) {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                tracing::error!("Task queue worker is gone, dropping job");
            }
        }
    }

    /// Enqueue a job and block until it has run, returning its result.
    /// `None` means the worker has terminated.
    pub fn run<T, F>(&self, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_sender, result_receiver) = mpsc::channel();
        self.spawn(move || {
            let _ = result_sender.send(job());
        });
        result_receiver.recv().ok()
    }

    /// Block until every job enqueued so far has finished
    pub fn flush(&self) {
        let _ = self.run(|| ());
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain remaining jobs and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
