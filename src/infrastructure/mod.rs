//! Infrastructure layer with caching, scheduling and external adapters.

/// Resource cache and in-flight download registry.
pub mod cache;
/// Engine and application configuration.
pub mod config;
/// Engine counters and periodic reporting.
pub mod diagnostics;
/// HTTP fetching and image decoding.
pub mod image;
/// Worker pools and dispatchers.
pub mod scheduling;

pub use cache::{BoundedCache, CacheStats, InFlightRegistry};
pub use config::{AppConfig, CliArgs, ConfigStore, EngineConfig, LogLevel};
pub use diagnostics::{DiagnosticsReporter, EngineStats};
pub use image::{HttpFetcher, ImageDecoder};
pub use scheduling::{DispatchQueue, InlineDispatcher, QueueDispatcher, WorkerPool, dispatch_channel};
