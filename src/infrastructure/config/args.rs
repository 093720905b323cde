use super::app_config::LogLevel;
use crate::infrastructure::scheduling::QueueOrder;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "slotimage",
    version,
    about = "Fetch, decode and bind remote images into display slots",
    long_about = None
)]
pub struct CliArgs {
    /// Image URLs to load, spread round-robin over the slots.
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Number of display slots.
    #[arg(long)]
    pub slots: Option<usize>,

    /// Load the first URL synchronously before queueing the rest.
    #[arg(long)]
    pub blocking_first: bool,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// Save the merged configuration to the default config file.
    #[arg(long)]
    pub write_config: bool,

    /// Classification worker count.
    #[arg(long)]
    pub pre_pool_size: Option<usize>,

    /// Download worker count.
    #[arg(long)]
    pub download_pool_size: Option<usize>,

    /// Cache size in bytes that triggers eviction.
    #[arg(long)]
    pub high_water_mark: Option<usize>,

    /// Cache size in bytes eviction brings the cache down to.
    #[arg(long)]
    pub low_water_mark: Option<usize>,

    /// Hold cached images through weak references.
    #[arg(long)]
    pub weak_payloads: Option<bool>,

    /// Classification queue order.
    #[arg(long, value_enum)]
    pub pre_queue_order: Option<QueueOrder>,

    /// Fetch on a separate thread and resume the pipeline from there.
    #[arg(long)]
    pub deferred: Option<bool>,

    /// HTTP timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Downscale images wider than this.
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Downscale images taller than this.
    #[arg(long)]
    pub max_height: Option<u32>,
}
