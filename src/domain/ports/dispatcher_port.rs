//! Port for marshalling work onto the UI thread.

/// Unit of work handed to a dispatcher.
pub type DispatchTask = Box<dyn FnOnce() + Send + 'static>;

/// Logical single thread on which bind callbacks run.
pub trait Dispatcher: Send + Sync {
    /// Schedules `task`. Returns false if the task was refused.
    fn schedule(&self, task: DispatchTask) -> bool;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Dispatcher that holds tasks until the test runs them.
    #[derive(Default)]
    pub struct ManualDispatcher {
        tasks: Mutex<Vec<DispatchTask>>,
        refuse: std::sync::atomic::AtomicBool,
    }

    impl ManualDispatcher {
        /// Creates an empty dispatcher.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every later `schedule` call fail.
        pub fn refuse_tasks(&self) {
            self.refuse
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }

        /// Number of queued tasks.
        pub fn pending(&self) -> usize {
            self.tasks.lock().len()
        }

        /// Runs queued tasks in order, including tasks they schedule.
        pub fn run_all(&self) -> usize {
            let mut ran = 0;
            loop {
                let batch = std::mem::take(&mut *self.tasks.lock());
                if batch.is_empty() {
                    return ran;
                }
                for task in batch {
                    task();
                    ran += 1;
                }
            }
        }
    }

    impl Dispatcher for ManualDispatcher {
        fn schedule(&self, task: DispatchTask) -> bool {
            if self.refuse.load(std::sync::atomic::Ordering::SeqCst) {
                return false;
            }
            self.tasks.lock().push(task);
            true
        }
    }
}
