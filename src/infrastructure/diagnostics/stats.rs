//! Engine-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters updated by commands.
#[derive(Debug, Default)]
pub struct EngineStats {
    requests: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    decode_failures: AtomicU64,
    out_of_memory: AtomicU64,
    aborted: AtomicU64,
    completed: AtomicU64,
    faults: AtomicU64,
}

/// Copy of [`EngineStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests accepted by the facade.
    pub requests: u64,
    /// Fetches handed to collaborators.
    pub fetches: u64,
    /// Fetches that failed.
    pub fetch_failures: u64,
    /// Decodes that failed for reasons other than memory.
    pub decode_failures: u64,
    /// Out-of-memory conditions recovered from.
    pub out_of_memory: u64,
    /// Requests that ended aborted.
    pub aborted: u64,
    /// Requests that ended normally.
    pub completed: u64,
    /// Panics caught inside commands.
    pub faults: u64,
}

impl EngineStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_out_of_memory(&self) {
        self.out_of_memory.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_over(&self, aborted: bool) {
        if aborted {
            self.aborted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn out_of_memory(&self) -> u64 {
        self.out_of_memory.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            out_of_memory: self.out_of_memory.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}
