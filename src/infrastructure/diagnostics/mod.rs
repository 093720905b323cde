//! Engine counters and periodic reporting.

pub mod reporter;
pub mod stats;

pub use reporter::DiagnosticsReporter;
pub use stats::{EngineStats, StatsSnapshot};
