//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::EngineError;
use crate::infrastructure::cache::{CachePolicy, DEFAULT_HIGH_WATER_MARK, DEFAULT_LOW_WATER_MARK};
use crate::infrastructure::scheduling::QueueOrder;

/// Default number of classification workers.
pub const DEFAULT_PRE_POOL_SIZE: usize = 2;

/// Default number of download workers.
pub const DEFAULT_DOWNLOAD_POOL_SIZE: usize = 3;

/// Setup surface of an engine instance, fixed once its pools exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Classification worker count.
    #[serde(default = "default_pre_pool_size")]
    pub pre_pool_size: usize,

    /// Download worker count.
    #[serde(default = "default_download_pool_size")]
    pub download_pool_size: usize,

    /// Cache size in bytes above which an insert triggers a cleanup.
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Cache size in bytes a cleanup evicts down to.
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: usize,

    /// Hold cached payloads through weak references.
    #[serde(default)]
    pub weak_payloads: bool,

    /// Recycle evicted payloads no slot is bound to.
    #[serde(default)]
    pub recycle_on_evict: bool,

    /// Pick-up order of the classification queue.
    #[serde(default = "default_pre_queue_order")]
    pub pre_queue_order: QueueOrder,

    /// Period of diagnostics reports in milliseconds. Disabled when absent.
    #[serde(default)]
    pub diagnostics_interval_ms: Option<u64>,
}

const fn default_pre_pool_size() -> usize {
    DEFAULT_PRE_POOL_SIZE
}

const fn default_download_pool_size() -> usize {
    DEFAULT_DOWNLOAD_POOL_SIZE
}

const fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}

const fn default_low_water_mark() -> usize {
    DEFAULT_LOW_WATER_MARK
}

const fn default_pre_queue_order() -> QueueOrder {
    QueueOrder::Lifo
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pre_pool_size: DEFAULT_PRE_POOL_SIZE,
            download_pool_size: DEFAULT_DOWNLOAD_POOL_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            weak_payloads: false,
            recycle_on_evict: false,
            pre_queue_order: default_pre_queue_order(),
            diagnostics_interval_ms: None,
        }
    }
}

impl EngineConfig {
    /// Sets both water marks.
    #[must_use]
    pub const fn with_water_marks(mut self, high: usize, low: usize) -> Self {
        self.high_water_mark = high;
        self.low_water_mark = low;
        self
    }

    /// Sets both pool sizes.
    #[must_use]
    pub const fn with_pool_sizes(mut self, pre: usize, download: usize) -> Self {
        self.pre_pool_size = pre;
        self.download_pool_size = download;
        self
    }

    /// Checks the configuration for consistency.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidConfig`] for empty pools or inverted water marks.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.pre_pool_size == 0 {
            return Err(EngineError::invalid_config("pre_pool_size must be at least 1"));
        }
        if self.download_pool_size == 0 {
            return Err(EngineError::invalid_config(
                "download_pool_size must be at least 1",
            ));
        }
        if self.low_water_mark > self.high_water_mark {
            return Err(EngineError::invalid_config(format!(
                "low_water_mark ({}) exceeds high_water_mark ({})",
                self.low_water_mark, self.high_water_mark
            )));
        }
        if self.diagnostics_interval_ms == Some(0) {
            return Err(EngineError::invalid_config(
                "diagnostics_interval_ms must be positive",
            ));
        }
        Ok(())
    }

    /// Cache policy derived from this configuration.
    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            high_water_mark: self.high_water_mark,
            low_water_mark: self.low_water_mark,
            weak_payloads: self.weak_payloads,
            recycle_on_evict: self.recycle_on_evict,
        }
    }

    /// Diagnostics period, if reporting is enabled.
    #[must_use]
    pub fn diagnostics_interval(&self) -> Option<Duration> {
        self.diagnostics_interval_ms.map(Duration::from_millis)
    }
}
