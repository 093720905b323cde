//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::args::CliArgs;
use super::engine_config::EngineConfig;
use crate::domain::entities::ResourceSpec;

const APP_NAME: &str = "slotimage";
const APP_QUALIFIER: &str = "dev";
const APP_ORGANIZATION: &str = "slotimage";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Configuration of the command-line fetcher.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Number of display slots the URLs are spread over.
    #[serde(default = "default_slots")]
    pub slots: usize,

    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// HTTP configuration.
    #[serde(default)]
    pub http: HttpConfig,

    /// Decoding configuration.
    #[serde(default)]
    pub decode: DecodeConfig,
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Fetch on a separate thread and resume the pipeline from there.
    #[serde(default)]
    pub deferred: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            deferred: false,
        }
    }
}

/// Image decoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Downscale images wider than this.
    #[serde(default)]
    pub max_width: Option<u32>,

    /// Downscale images taller than this.
    #[serde(default)]
    pub max_height: Option<u32>,

    /// Largest allocation a single decode may make, in bytes.
    #[serde(default = "default_max_alloc")]
    pub max_alloc_bytes: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_alloc_bytes: default_max_alloc(),
        }
    }
}

impl DecodeConfig {
    /// Per-request decode hints.
    #[must_use]
    pub const fn resource_spec(&self) -> ResourceSpec {
        ResourceSpec {
            max_width: self.max_width,
            max_height: self.max_height,
        }
    }
}

const fn default_slots() -> usize {
    4
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_max_alloc() -> u64 {
    512 * 1024 * 1024
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(slots) = args.slots {
            self.slots = slots;
        }
        if let Some(pre_pool_size) = args.pre_pool_size {
            self.engine.pre_pool_size = pre_pool_size;
        }
        if let Some(download_pool_size) = args.download_pool_size {
            self.engine.download_pool_size = download_pool_size;
        }
        if let Some(high_water_mark) = args.high_water_mark {
            self.engine.high_water_mark = high_water_mark;
        }
        if let Some(low_water_mark) = args.low_water_mark {
            self.engine.low_water_mark = low_water_mark;
        }
        if let Some(weak_payloads) = args.weak_payloads {
            self.engine.weak_payloads = weak_payloads;
        }
        if let Some(pre_queue_order) = args.pre_queue_order {
            self.engine.pre_queue_order = pre_queue_order;
        }
        if let Some(deferred) = args.deferred {
            self.http.deferred = deferred;
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.http.timeout_secs = timeout_secs;
        }
        if let Some(max_width) = args.max_width {
            self.decode.max_width = Some(max_width);
        }
        if let Some(max_height) = args.max_height {
            self.decode.max_height = Some(max_height);
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("slotimage.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            slots: default_slots(),
            engine: EngineConfig::default(),
            http: HttpConfig::default(),
            decode: DecodeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_config_sections() {
        let toml_content = r#"
            log_level = "debug"
            slots = 8

            [engine]
            high_water_mark = 4194304
            low_water_mark = 2097152
            recycle_on_evict = true

            [http]
            deferred = true
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.slots, 8);
        assert_eq!(config.engine.high_water_mark, 4 * 1024 * 1024);
        assert!(config.engine.recycle_on_evict);
        assert!(config.http.deferred);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.decode, DecodeConfig::default());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.slots, 4);
        assert!(config.engine.validate().is_ok());
        assert!(!config.http.deferred);
        assert_eq!(config.decode.resource_spec(), ResourceSpec::unconstrained());
    }

    #[test]
    fn test_args_override_file_values() {
        let mut config: AppConfig = toml::from_str("slots = 2\n[engine]\npre_pool_size = 1\n")
            .expect("Failed to parse config");
        let args = CliArgs::parse_from([
            "slotimage",
            "--slots",
            "6",
            "--pre-pool-size",
            "3",
            "--max-width",
            "400",
            "http://img/a.png",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.slots, 6);
        assert_eq!(config.engine.pre_pool_size, 3);
        assert_eq!(config.decode.max_width, Some(400));
        assert_eq!(config.decode.max_height, None);
    }
}
