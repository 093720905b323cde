//! Engine facade.
//!
//! [`Engine`] owns the cache, the in-flight registry, the per-slot priority
//! maps and both worker pools. Each request becomes a command that is
//! classified on the pre pool, fetched on the download pool if needed and
//! bound on the caller's dispatcher. Only the most recent request for a slot
//! ever binds.

mod command;
mod priority;

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use self::command::{Command, Request};
use self::priority::PriorityMaps;
use crate::domain::entities::{CommandId, Resource, ResourceSpec, Slot};
use crate::domain::errors::EngineError;
use crate::domain::ports::{DiagnosticsListener, Dispatcher, EngineDiagnostics, Instructions};
use crate::infrastructure::cache::{BoundedCache, CacheEntryInfo, CacheStats, InFlightRegistry};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::diagnostics::{DiagnosticsReporter, EngineStats, StatsSnapshot};
use crate::infrastructure::scheduling::{QueueOrder, WorkerPool};

pub use crate::domain::ports::FetchResolver;

const PRE_POOL_NAME: &str = "img-pre";
const DOWNLOAD_POOL_NAME: &str = "img-download";

/// State reachable from commands. Commands hold it weakly.
pub(crate) struct EngineShared<R: Resource> {
    config: EngineConfig,
    cache: BoundedCache<R>,
    in_flight: InFlightRegistry<R>,
    maps: PriorityMaps<R>,
    pre_pool: WorkerPool,
    download_pool: WorkerPool,
    stats: Arc<EngineStats>,
    next_id: AtomicU64,
    registration: Mutex<()>,
    disposed: AtomicBool,
}

impl<R: Resource> EngineShared<R> {
    fn diagnostics(&self) -> EngineDiagnostics {
        EngineDiagnostics {
            cache_entries: self.cache.len(),
            cache_bytes: self.cache.total_size(),
            pending_pre: self.maps.pending_pre_len(),
            pending_stack: self.pre_pool.queued(),
            pending_download: self.maps.pending_download_len(),
            in_flight: self.in_flight.len(),
            cleanups: self.cache.cleanup_count(),
            out_of_memory: self.stats.out_of_memory(),
        }
    }
}

/// Builds an [`Engine`].
pub struct EngineBuilder<R: Resource> {
    config: EngineConfig,
    listener: Option<Arc<dyn DiagnosticsListener>>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> EngineBuilder<R> {
    /// Starts from `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            listener: None,
            _resource: PhantomData,
        }
    }

    /// Delivers periodic diagnostics to `listener`. Only takes effect when
    /// the configuration sets a diagnostics interval.
    #[must_use]
    pub fn diagnostics(mut self, listener: Arc<dyn DiagnosticsListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Validates the configuration and starts the worker pools.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidConfig`] for an inconsistent configuration
    /// and [`EngineError::WorkerSpawn`] if a thread cannot be started.
    pub fn build(self) -> Result<Engine<R>, EngineError> {
        self.config.validate()?;

        let pre_pool = WorkerPool::new(
            PRE_POOL_NAME,
            self.config.pre_pool_size,
            self.config.pre_queue_order,
        )?;
        let download_pool = WorkerPool::new(
            DOWNLOAD_POOL_NAME,
            self.config.download_pool_size,
            QueueOrder::Fifo,
        )?;

        let shared = Arc::new(EngineShared {
            cache: BoundedCache::new(self.config.cache_policy()),
            in_flight: InFlightRegistry::new(),
            maps: PriorityMaps::new(),
            pre_pool,
            download_pool,
            stats: Arc::new(EngineStats::new()),
            next_id: AtomicU64::new(0),
            registration: Mutex::new(()),
            disposed: AtomicBool::new(false),
            config: self.config,
        });

        let reporter = match (shared.config.diagnostics_interval(), self.listener) {
            (Some(interval), Some(listener)) => {
                let weak = Arc::downgrade(&shared);
                Some(DiagnosticsReporter::spawn(interval, listener, move || {
                    weak.upgrade().map(|shared| shared.diagnostics())
                })?)
            }
            _ => None,
        };

        info!(
            pre_pool = shared.config.pre_pool_size,
            download_pool = shared.config.download_pool_size,
            high_water_mark = shared.config.high_water_mark,
            low_water_mark = shared.config.low_water_mark,
            "Engine started"
        );

        Ok(Engine { shared, reporter })
    }
}

/// Fetches, decodes, caches and binds resources to slots.
///
/// Independent engines share nothing. Dropping an engine disposes it.
pub struct Engine<R: Resource> {
    shared: Arc<EngineShared<R>>,
    reporter: Option<DiagnosticsReporter>,
}

impl<R: Resource> Engine<R> {
    /// Creates an engine without a diagnostics listener.
    ///
    /// # Errors
    /// See [`EngineBuilder::build`].
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        EngineBuilder::new(config).build()
    }

    /// Starts building an engine.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder<R> {
        EngineBuilder::new(config)
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Requests the resource for `uid` and binds it to `slot`.
    ///
    /// Returns immediately. A still-queued earlier request for the same slot
    /// is cancelled with `on_over(true)`; one that already started aborts at
    /// its next checkpoint. A request without a slot classifies and fetches
    /// but never binds.
    ///
    /// # Errors
    /// Returns [`EngineError::Disposed`] after `on_over(true)` if the engine
    /// no longer accepts work.
    pub fn get(
        &self,
        slot: Option<Slot>,
        uid: Option<&str>,
        spec: ResourceSpec,
        dispatcher: Arc<dyn Dispatcher>,
        instructions: Arc<dyn Instructions<R>>,
    ) -> Result<CommandId, EngineError> {
        let command = self.command(slot, uid, spec, dispatcher, instructions, false);
        let id = command.id();
        self.register(&command, true)?;

        let job = Arc::clone(&command);
        if !self.shared.pre_pool.submit(id.0, Box::new(move || job.run())) {
            if let Some(slot) = &command.request().slot {
                self.shared.maps.remove_command(slot, id);
            }
            command.request().over(true);
            return Err(EngineError::Disposed);
        }

        debug!(command = %id, slot = ?command.request().slot.as_ref().map(Slot::id), uid, "Request queued");
        Ok(id)
    }

    /// Like [`Engine::get`], but runs the whole pipeline on the calling
    /// thread, binding included. Meant for a first frame on the UI thread.
    ///
    /// # Errors
    /// Returns [`EngineError::Disposed`] after `on_over(true)` if the engine
    /// no longer accepts work.
    pub fn get_blocking(
        &self,
        slot: Option<Slot>,
        uid: Option<&str>,
        spec: ResourceSpec,
        dispatcher: Arc<dyn Dispatcher>,
        instructions: Arc<dyn Instructions<R>>,
    ) -> Result<CommandId, EngineError> {
        let command = self.command(slot, uid, spec, dispatcher, instructions, true);
        self.register(&command, false)?;

        debug!(command = %command.id(), uid, "Running blocking request");
        command.run();
        Ok(command.id())
    }

    fn command(
        &self,
        slot: Option<Slot>,
        uid: Option<&str>,
        spec: ResourceSpec,
        dispatcher: Arc<dyn Dispatcher>,
        instructions: Arc<dyn Instructions<R>>,
        blocking: bool,
    ) -> Arc<Command<R>> {
        self.shared.stats.record_request();
        let id = CommandId(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let request = Request::new(
            slot,
            uid.map(ToOwned::to_owned),
            spec,
            dispatcher,
            instructions,
            blocking,
            Arc::clone(&self.shared.stats),
        );
        Command::pre(id, Arc::new(request), Arc::downgrade(&self.shared))
    }

    /// Makes `command` the latest for its slot, cancelling a queued predecessor.
    fn register(&self, command: &Arc<Command<R>>, pending: bool) -> Result<(), EngineError> {
        if self.shared.disposed.load(Ordering::Acquire) {
            command.request().over(true);
            return Err(EngineError::Disposed);
        }
        let Some(slot) = &command.request().slot else {
            return Ok(());
        };

        let cancelled = {
            let _registration = self.shared.registration.lock();
            self.shared.maps.set_latest(slot, command.id());
            let previous = self.shared.maps.take_pending_pre(slot);
            if pending {
                self.shared.maps.insert_pending_pre(slot, Arc::clone(command));
            }
            previous.filter(|previous| self.shared.pre_pool.remove(previous.id().0))
        };

        if let Some(previous) = cancelled {
            trace!(command = %previous.id(), slot = %slot, "Cancelled queued request");
            previous.request().over(true);
        }
        Ok(())
    }

    /// Drops all queued work, the priority maps, the in-flight registry and
    /// the cache. Queued requests that get dropped are not notified.
    pub fn clear(&self) {
        let _registration = self.shared.registration.lock();
        let pre = self.shared.pre_pool.drain();
        let download = self.shared.download_pool.drain();
        self.shared.maps.clear();
        self.shared.in_flight.clear();
        self.shared.cache.clear();
        debug!(pre, download, "Engine cleared");
    }

    /// Stops the diagnostics reporter and both pools. Running commands finish
    /// first; later requests fail with [`EngineError::Disposed`].
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(reporter) = &self.reporter {
            reporter.stop();
        }
        self.shared.pre_pool.shutdown();
        self.shared.download_pool.shutdown();
        self.shared.maps.clear();
        info!("Engine disposed");
    }

    /// Returns true once [`Engine::dispose`] ran.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Current engine counters.
    #[must_use]
    pub fn diagnostics(&self) -> EngineDiagnostics {
        self.shared.diagnostics()
    }

    /// Per-entry view of the cache, sorted by URL.
    #[must_use]
    pub fn cache_entries(&self) -> Vec<CacheEntryInfo> {
        self.shared.cache.entries()
    }

    /// Cache hit and size statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Request counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl<R: Resource> Drop for Engine<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<R: Resource> std::fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.shared.config)
            .field("diagnostics", &self.diagnostics())
            .finish_non_exhaustive()
    }
}
