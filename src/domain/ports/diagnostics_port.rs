//! Port for periodic engine diagnostics.

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineDiagnostics {
    /// Number of cached resources.
    pub cache_entries: usize,
    /// Accounted size of cached resources in bytes.
    pub cache_bytes: usize,
    /// Slots with a classification command not yet started.
    pub pending_pre: usize,
    /// Jobs waiting in the classification pool queue.
    pub pending_stack: usize,
    /// Slots with a download command not yet started.
    pub pending_download: usize,
    /// URLs with a download in flight.
    pub in_flight: usize,
    /// Completed cache cleanups.
    pub cleanups: u64,
    /// Out-of-memory conditions recovered from.
    pub out_of_memory: u64,
}

impl std::fmt::Display for EngineDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cache: {} entries / {} bytes, pending: {} pre ({} queued) {} download, {} in flight, {} cleanups, {} oom",
            self.cache_entries,
            self.cache_bytes,
            self.pending_pre,
            self.pending_stack,
            self.pending_download,
            self.in_flight,
            self.cleanups,
            self.out_of_memory
        )
    }
}

/// Receives diagnostics snapshots from the engine's reporter thread.
pub trait DiagnosticsListener: Send + Sync {
    /// Called with the latest counters.
    fn on_diagnostics(&self, diagnostics: &EngineDiagnostics);
}
