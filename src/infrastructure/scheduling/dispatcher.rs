//! Dispatcher adapters.

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::ports::{DispatchTask, Dispatcher};

/// Creates a dispatcher whose tasks run wherever the returned queue is drained.
#[must_use]
pub fn dispatch_channel() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueDispatcher { tx }, DispatchQueue { rx })
}

/// Sending half of a dispatch channel.
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

impl Dispatcher for QueueDispatcher {
    fn schedule(&self, task: DispatchTask) -> bool {
        self.tx.send(task).is_ok()
    }
}

/// Receiving half of a dispatch channel, owned by the UI thread.
#[derive(Debug)]
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<DispatchTask>,
}

impl DispatchQueue {
    /// Runs every task queued so far without blocking. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "Ran pending dispatch tasks");
        }
        ran
    }

    /// Runs tasks until every dispatcher handle is gone. Returns how many ran.
    ///
    /// Must not be called from inside an async runtime.
    pub fn run(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.rx.blocking_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Refuses further tasks; already queued tasks can still be run.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Dispatcher that runs every task immediately on the scheduling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn schedule(&self, task: DispatchTask) -> bool {
        task();
        true
    }
}
