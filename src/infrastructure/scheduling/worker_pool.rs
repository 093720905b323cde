//! Fixed-size worker thread pool with an addressable queue.
//!
//! Queued jobs carry a caller-chosen key so a job that has not started yet
//! can be pulled back out. Once a worker picked a job up it runs to the end.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::domain::errors::EngineError;

/// Unit of work run by a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Order in which queued jobs are picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Oldest job first.
    #[default]
    Fifo,
    /// Newest job first.
    Lifo,
}

struct Queue {
    jobs: VecDeque<(u64, Job)>,
    shutdown: bool,
}

struct Shared {
    name: String,
    order: QueueOrder,
    queue: Mutex<Queue>,
    available: Condvar,
}

impl Shared {
    fn next_job(&self) -> Option<Job> {
        let mut queue = self.queue.lock();
        loop {
            if queue.shutdown {
                return None;
            }
            let next = match self.order {
                QueueOrder::Fifo => queue.jobs.pop_front(),
                QueueOrder::Lifo => queue.jobs.pop_back(),
            };
            if let Some((key, job)) = next {
                trace!(pool = %self.name, key, "Job picked up");
                return Some(job);
            }
            self.available.wait(&mut queue);
        }
    }
}

/// Named pool of worker threads sharing one queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `size` workers.
    ///
    /// # Errors
    /// Returns [`EngineError::WorkerSpawn`] if a thread cannot be created.
    pub fn new(name: &str, size: usize, order: QueueOrder) -> Result<Self, EngineError> {
        let pool = Self {
            shared: Arc::new(Shared {
                name: name.to_string(),
                order,
                queue: Mutex::new(Queue {
                    jobs: VecDeque::new(),
                    shutdown: false,
                }),
                available: Condvar::new(),
            }),
            workers: Mutex::new(Vec::with_capacity(size)),
        };

        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || run_worker(&shared));
            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(EngineError::worker_spawn(name, e));
                }
            }
        }

        debug!(pool = name, size, ?order, "Worker pool started");
        Ok(pool)
    }

    /// Pool name, also the prefix of its thread names.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Queues a job under `key`. Returns false once the pool is shut down.
    pub fn submit(&self, key: u64, job: Job) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return false;
        }
        queue.jobs.push_back((key, job));
        self.shared.available.notify_one();
        true
    }

    /// Removes a job that has not started yet. Returns false if no queued job has `key`.
    pub fn remove(&self, key: u64) -> bool {
        let removed = {
            let mut queue = self.shared.queue.lock();
            queue
                .jobs
                .iter()
                .position(|(queued, _)| *queued == key)
                .and_then(|index| queue.jobs.remove(index))
        };
        removed.is_some()
    }

    /// Drops every queued job and returns how many there were.
    pub fn drain(&self) -> usize {
        let drained: Vec<_> = self.shared.queue.lock().jobs.drain(..).collect();
        drained.len()
    }

    /// Number of jobs waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// Drains the queue, stops the workers and joins them.
    ///
    /// Jobs already running finish first. Safe to call from a worker of this
    /// pool, which is then left to exit on its own.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            self.shared.available.notify_all();
            queue.jobs.drain(..).collect()
        };
        drop(drained);

        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!(pool = %self.shared.name, "Worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared) {
    while let Some(job) = shared.next_job() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
            error!(pool = %shared.name, message = %panic_message(panic.as_ref()), "Job panicked");
        }
    }
    trace!(pool = %shared.name, "Worker exiting");
}

/// Extracts the message of a caught panic.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn gate() -> (Arc<(Mutex<bool>, Condvar)>, Job) {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let inner = gate.clone();
        let job: Job = Box::new(move || {
            let (open, cv) = &*inner;
            let mut open = open.lock();
            while !*open {
                cv.wait(&mut open);
            }
        });
        (gate, job)
    }

    fn open(gate: &Arc<(Mutex<bool>, Condvar)>) {
        let (open, cv) = &**gate;
        *open.lock() = true;
        cv.notify_all();
    }

    #[test]
    fn test_jobs_run_on_named_threads() {
        let pool = WorkerPool::new("test-pool", 2, QueueOrder::Fifo).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.submit(
            1,
            Box::new(move || {
                let name = thread::current().name().map(String::from);
                tx.send(name).unwrap();
            }),
        );

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("test-pool-"));
    }

    #[test]
    fn test_queued_job_can_be_removed() {
        let pool = WorkerPool::new("remove", 1, QueueOrder::Fifo).unwrap();
        let (gate, blocker) = gate();
        let (tx, rx) = mpsc::channel();

        pool.submit(1, blocker);
        pool.submit(2, Box::new(move || tx.send(2).unwrap()));

        assert!(pool.remove(2));
        assert!(!pool.remove(2));
        open(&gate);

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_lifo_runs_newest_first() {
        let pool = WorkerPool::new("lifo", 1, QueueOrder::Lifo).unwrap();
        let (gate, blocker) = gate();
        let (tx, rx) = mpsc::channel();

        pool.submit(0, blocker);
        std::thread::sleep(Duration::from_millis(50));
        for key in 1..=3 {
            let tx = tx.clone();
            pool.submit(key, Box::new(move || tx.send(key).unwrap()));
        }
        open(&gate);

        let order: Vec<u64> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new("panics", 1, QueueOrder::Fifo).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.submit(1, Box::new(|| panic!("boom")));
        pool.submit(2, Box::new(move || tx.send(()).unwrap()));

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_submit_after_shutdown_is_refused() {
        let pool = WorkerPool::new("stopped", 1, QueueOrder::Fifo).unwrap();
        pool.shutdown();
        assert!(!pool.submit(1, Box::new(|| {})));
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_drain_counts_queued_jobs() {
        let pool = WorkerPool::new("drain", 1, QueueOrder::Fifo).unwrap();
        let (gate, blocker) = gate();
        pool.submit(0, blocker);
        std::thread::sleep(Duration::from_millis(50));
        pool.submit(1, Box::new(|| {}));
        pool.submit(2, Box::new(|| {}));

        assert_eq!(pool.drain(), 2);
        open(&gate);
    }

    #[test]
    fn test_panic_message_extraction() {
        let caught = catch_unwind(|| panic!("with {}", "format")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "with format");
    }
}
