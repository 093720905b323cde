//! Engine lifecycle errors.

use thiserror::Error;

/// Errors returned by engine construction and the request facade.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum EngineError {
    #[error("invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to spawn {pool} worker: {source}")]
    WorkerSpawn {
        pool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine has been disposed")]
    Disposed,
}

impl EngineError {
    /// Creates invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Creates worker spawn error.
    #[must_use]
    pub fn worker_spawn(pool: impl Into<String>, source: std::io::Error) -> Self {
        Self::WorkerSpawn {
            pool: pool.into(),
            source,
        }
    }
}
