//! Application and engine configuration.

pub mod app_config;
pub mod args;
pub mod engine_config;
pub mod storage;

pub use app_config::{AppConfig, DecodeConfig, HttpConfig, LogLevel};
pub use args::CliArgs;
pub use engine_config::EngineConfig;
pub use storage::{ConfigError, ConfigStore};
