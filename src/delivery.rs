//! Executors that run subscriber callbacks.
//!
//! Coordination code only ever enqueues work here; it never waits for a
//! callback to finish.

use crate::error::{Result, SyncError};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::thread::JoinHandle;

/// A unit of delivery work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs delivery jobs, in submission order.
pub trait DeliveryExecutor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs each job immediately on the submitting thread.
///
/// Jobs are submitted after the registry and manager locks are released, so
/// a callback may call back into the client. Meant for tests and
/// single-threaded embeddings.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl DeliveryExecutor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Runs jobs on one dedicated thread, fed by an unbounded queue.
pub struct ThreadExecutor {
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadExecutor {
    /// Start the delivery thread.
    pub fn spawn(thread_name: impl Into<String>) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();

        let worker = std::thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || {
                for job in receiver.iter() {
                    job();
                }
            })
            .map_err(|e| SyncError::Executor(e.to_string()))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting jobs and wait for queued ones to run.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            // A job may drop the last executor handle from the worker itself
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::warn!("delivery thread panicked");
            }
        }
    }
}

impl DeliveryExecutor for ThreadExecutor {
    fn execute(&self, job: Job) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(job).is_err() {
                    tracing::warn!("delivery thread gone, dropping job");
                }
            }
            None => tracing::debug!("executor shut down, dropping job"),
        }
    }
}

impl Drop for ThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_inline_runs_immediately() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        InlineExecutor.execute(Box::new(move || sink.lock().push(1)));
        assert_eq!(*hits.lock(), vec![1]);
    }

    #[test]
    fn test_thread_executor_preserves_order() {
        let executor = ThreadExecutor::spawn("delivery-test").unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        for i in 0..50 {
            let tx = tx.clone();
            executor.execute(Box::new(move || {
                let _ = tx.send(i);
            }));
        }

        let received: Vec<i32> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(received, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_jobs_after_shutdown_are_dropped() {
        let executor = ThreadExecutor::spawn("delivery-test").unwrap();
        executor.shutdown();

        let (tx, rx) = crossbeam_channel::unbounded::<()>();
        executor.execute(Box::new(move || {
            let _ = tx.send(());
        }));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
