use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use image::DynamicImage;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, trace};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use slotimage::application::{BindingInstructions, Engine, RequestEvent};
use slotimage::domain::ports::{DiagnosticsListener, EngineDiagnostics};
use slotimage::domain::{Dispatcher, Slot};
use slotimage::infrastructure::config::{AppConfig, CliArgs, ConfigStore};
use slotimage::infrastructure::image::{HttpFetcher, ImageDecoder};
use slotimage::infrastructure::scheduling::dispatch_channel;

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let store = ConfigStore::new()?;
    let mut config = store.load_config(args.config.as_deref())?;
    config.merge_with_args(args);

    if args.write_config {
        let path = store.save_config(&config)?;
        eprintln!("Configuration written to {}", path.display());
    }
    Ok(config)
}

struct LogListener;

impl DiagnosticsListener for LogListener {
    fn on_diagnostics(&self, diagnostics: &EngineDiagnostics) {
        info!(%diagnostics, "Engine diagnostics");
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    requested: usize,
    bound: usize,
    unavailable: usize,
    aborted: usize,
    cache_entries: usize,
    cache_bytes: usize,
    slots: BTreeMap<u64, String>,
}

impl Summary {
    fn record(&mut self, event: &RequestEvent) {
        match event {
            RequestEvent::Bound { success: true, .. } => self.bound += 1,
            RequestEvent::Bound { success: false, .. } => self.unavailable += 1,
            RequestEvent::Over { aborted: true, .. } => self.aborted += 1,
            RequestEvent::Ready { .. } | RequestEvent::Over { .. } => {}
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
            return Ok(());
        }
        println!(
            "{} requested, {} bound, {} unavailable, {} superseded",
            self.requested, self.bound, self.unavailable, self.aborted
        );
        println!("cache: {} entries, {} bytes", self.cache_entries, self.cache_bytes);
        for (slot, shown) in &self.slots {
            println!("  slot#{slot}: {shown}");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = slotimage::VERSION, urls = args.urls.len(), "Starting slotimage");

    let engine = Engine::<DynamicImage>::builder(config.engine.clone())
        .diagnostics(Arc::new(LogListener))
        .build()?;

    let shown = Arc::new(Mutex::new(BTreeMap::new()));
    let bound = Arc::clone(&shown);
    let loading = Arc::clone(&shown);
    let (events, mut event_rx) = mpsc::unbounded_channel();

    let instructions = BindingInstructions::new(
        Arc::new(HttpFetcher::new(&config.http)?),
        Arc::new(ImageDecoder::new(&config.decode)),
        move |slot: &Slot, downloaded, payload: Option<&Arc<DynamicImage>>| {
            let Some(image) = payload else {
                bound.lock().insert(slot.id().0, "unavailable".to_string());
                return Ok(false);
            };
            let origin = if downloaded { "downloaded" } else { "cached" };
            let label = format!("{}x{} ({origin})", image.width(), image.height());
            bound.lock().insert(slot.id().0, label);
            Ok(true)
        },
    )
    .with_placeholder(move |slot| {
        trace!(slot = %slot, "Showing placeholder");
        loading.lock().insert(slot.id().0, "loading".to_string());
    })
    .with_events(events);

    let slots: Vec<Slot> = (0..config.slots.max(1) as u64).map(Slot::cell).collect();
    let spec = config.decode.resource_spec();
    let (dispatcher, mut queue) = dispatch_channel();
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(dispatcher);

    for (index, url) in args.urls.iter().enumerate() {
        let slot = slots[index % slots.len()].clone();
        let request = instructions.for_request(Some(url.as_str()));
        if index == 0 && args.blocking_first {
            engine.get_blocking(Some(slot), Some(url.as_str()), spec, Arc::clone(&dispatcher), request)?;
        } else {
            engine.get(Some(slot), Some(url.as_str()), spec, Arc::clone(&dispatcher), request)?;
        }
    }
    drop(dispatcher);

    let ran = queue.run();
    trace!(ran, "Dispatch queue drained");

    let mut summary = Summary {
        requested: args.urls.len(),
        ..Summary::default()
    };
    while let Ok(event) = event_rx.try_recv() {
        summary.record(&event);
    }
    let diagnostics = engine.diagnostics();
    summary.cache_entries = diagnostics.cache_entries;
    summary.cache_bytes = diagnostics.cache_bytes;
    summary.slots = std::mem::take(&mut *shown.lock());

    info!(stats = ?engine.stats(), cache = %engine.cache_stats(), "Finished");
    engine.dispose();

    summary.print(args.json)
}
