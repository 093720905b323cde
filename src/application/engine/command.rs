//! The command state machine.
//!
//! A request starts as a pre command that classifies it on the pre pool. If
//! the resource has to be fetched, a download command with the same id takes
//! over on the download pool. Whichever command produced the outcome flips
//! its phase to [`Phase::End`] and is scheduled again, this time on the
//! request's dispatcher, to bind.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::EngineShared;
use crate::domain::entities::{
    Classification, CommandId, Phase, Resource, ResourceSpec, Slot, SlotTag,
};
use crate::domain::errors::ResourceError;
use crate::domain::ports::{Dispatcher, FetchResolver, Fetched, Instructions};
use crate::infrastructure::cache::{BoundedCache, FlightOwner, Joined};
use crate::infrastructure::diagnostics::EngineStats;
use crate::infrastructure::scheduling::panic_message;

/// State shared by every command serving one request.
pub(crate) struct Request<R: Resource> {
    pub(crate) slot: Option<Slot>,
    pub(crate) uid: Option<String>,
    pub(crate) spec: ResourceSpec,
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    pub(crate) instructions: Arc<dyn Instructions<R>>,
    pub(crate) blocking: bool,
    stats: Arc<EngineStats>,
    over: AtomicBool,
}

impl<R: Resource> Request<R> {
    pub(crate) fn new(
        slot: Option<Slot>,
        uid: Option<String>,
        spec: ResourceSpec,
        dispatcher: Arc<dyn Dispatcher>,
        instructions: Arc<dyn Instructions<R>>,
        blocking: bool,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            slot,
            uid,
            spec,
            dispatcher,
            instructions,
            blocking,
            stats,
            over: AtomicBool::new(false),
        }
    }

    /// Sends the terminal notification. Later calls are ignored.
    pub(crate) fn over(&self, aborted: bool) {
        if self.over.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stats.record_over(aborted);
        self.instructions.on_over(aborted);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Pre,
    Download { url: String },
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Download { .. } => write!(f, "download"),
        }
    }
}

struct Outcome<R> {
    phase: Phase,
    classification: Option<Classification>,
    url: Option<String>,
    payload: Option<Arc<R>>,
    downloaded: bool,
}

impl<R> Default for Outcome<R> {
    fn default() -> Self {
        Self {
            phase: Phase::Start,
            classification: None,
            url: None,
            payload: None,
            downloaded: false,
        }
    }
}

pub(crate) struct Command<R: Resource> {
    id: CommandId,
    kind: CommandKind,
    request: Arc<Request<R>>,
    engine: Weak<EngineShared<R>>,
    outcome: Mutex<Outcome<R>>,
}

impl<R: Resource> Command<R> {
    pub(crate) fn pre(
        id: CommandId,
        request: Arc<Request<R>>,
        engine: Weak<EngineShared<R>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind: CommandKind::Pre,
            request,
            engine,
            outcome: Mutex::new(Outcome::default()),
        })
    }

    fn download(&self, url: String) -> Arc<Self> {
        Arc::new(Self {
            id: self.id,
            kind: CommandKind::Download { url },
            request: Arc::clone(&self.request),
            engine: self.engine.clone(),
            outcome: Mutex::new(Outcome::default()),
        })
    }

    pub(crate) const fn id(&self) -> CommandId {
        self.id
    }

    pub(crate) fn request(&self) -> &Request<R> {
        &self.request
    }

    /// Runs the current phase. Never unwinds into the caller.
    pub(crate) fn run(self: &Arc<Self>) {
        let Some(engine) = self.engine.upgrade() else {
            debug!(command = %self.id, "Engine gone, aborting command");
            self.request.over(true);
            return;
        };

        let phase = self.outcome.lock().phase;
        trace!(command = %self.id, kind = %self.kind, ?phase, "Running command");
        let result = catch_unwind(AssertUnwindSafe(|| match phase {
            Phase::Start => self.start(&engine),
            Phase::End => self.end(&engine),
        }));
        if let Err(panic) = result {
            self.fault(&engine, panic.as_ref());
        }
    }

    fn fault(&self, engine: &EngineShared<R>, panic: &(dyn Any + Send)) {
        engine.stats.record_fault();
        error!(
            command = %self.id,
            kind = %self.kind,
            message = %panic_message(panic),
            "Command panicked"
        );
        if let Some(slot) = &self.request.slot {
            engine.maps.remove_command(slot, self.id);
        }
        self.request.over(true);
    }

    fn start(self: &Arc<Self>, engine: &EngineShared<R>) {
        match &self.kind {
            CommandKind::Pre => self.classify(engine),
            CommandKind::Download { url } => self.fetch(engine, url),
        }
    }

    fn classify(self: &Arc<Self>, engine: &EngineShared<R>) {
        let request = &self.request;
        let slot = request.slot.as_ref();
        let uid = request.uid.as_deref();
        let instructions = &request.instructions;

        if let Some(slot) = slot {
            engine.maps.remove_pending_pre_if(slot, self.id);
            if !engine.maps.is_latest(slot, self.id) {
                trace!(command = %self.id, slot = %slot, "Superseded before classification");
                request.over(true);
                return;
            }
        }

        if instructions.has_local_resource(slot, uid, &request.spec) {
            self.record(Classification::Local, None, None, false);
            self.schedule_end(engine, request.blocking);
            return;
        }

        let key = instructions.compute_resource_key(uid, &request.spec);
        if let Some(url) = &key
            && let Some(payload) = engine.cache.get(url)
        {
            instructions.on_resource_ready(true, Some(&payload));
            self.record(Classification::CacheHit, Some(url.clone()), Some(payload), false);
            self.schedule_end(engine, request.blocking);
            return;
        }

        let temporary = slot.is_some() && instructions.has_temporary_resource(slot, uid, &request.spec);
        if temporary {
            self.bind_temporary();
        }

        let Some(url) = key else {
            let classification = if temporary {
                Classification::NullTemporary
            } else {
                Classification::NullNoTemporary
            };
            instructions.on_resource_ready(false, None);
            self.record(classification, None, None, false);
            self.schedule_end(engine, request.blocking);
            return;
        };

        self.outcome.lock().classification = Some(Classification::NotInCache);
        trace!(command = %self.id, url = %url, "Handing off to download");
        let download = self.download(url);

        if request.blocking {
            download.run();
            return;
        }

        if let Some(slot) = slot {
            engine.maps.insert_pending_download(slot, Arc::clone(&download));
        }
        let job = Arc::clone(&download);
        if !engine.download_pool.submit(self.id.0, Box::new(move || job.run())) {
            warn!(command = %self.id, "Download pool refused command");
            if let Some(slot) = slot {
                engine.maps.remove_command(slot, self.id);
            }
            request.over(true);
        }
    }

    fn bind_temporary(&self) {
        let Some(slot) = self.request.slot.clone() else {
            return;
        };
        if self.request.blocking {
            self.request.instructions.on_bind_temporary(&slot);
            return;
        }

        let id = self.id;
        let engine = self.engine.clone();
        let request = Arc::clone(&self.request);
        let scheduled = self.request.dispatcher.schedule(Box::new(move || {
            let current = engine
                .upgrade()
                .is_some_and(|engine| engine.maps.is_latest(&slot, id));
            if current {
                request.instructions.on_bind_temporary(&slot);
            }
        }));
        if !scheduled {
            warn!(command = %self.id, "Dispatcher refused placeholder bind");
        }
    }

    fn fetch(self: &Arc<Self>, engine: &EngineShared<R>, url: &str) {
        let request = &self.request;
        if let Some(slot) = &request.slot {
            engine.maps.remove_pending_download_if(slot, self.id);
        }

        if let Some(payload) = engine.cache.get(url) {
            self.deliver(engine, url, Some(payload), false, request.blocking);
            return;
        }

        match engine.in_flight.join(url, || engine.cache.peek(url)) {
            Joined::Cached(payload) => {
                engine.cache.record_access(url);
                self.deliver(engine, url, Some(payload), false, request.blocking);
            }
            Joined::Waiter(waiter) => {
                trace!(command = %self.id, url, "Waiting for download in flight");
                let payload = waiter.wait();
                if payload.is_some() {
                    engine.cache.record_access(url);
                }
                self.deliver(engine, url, payload, true, request.blocking);
            }
            Joined::Owner(owner) => {
                engine.stats.record_fetch();
                debug!(command = %self.id, url, "Fetching resource");
                match request.instructions.fetch_bytes(url, &request.spec) {
                    Ok(Fetched::Bytes(bytes)) => self.complete(engine, owner, Ok(bytes), request.blocking),
                    Ok(Fetched::Later(deferred)) => {
                        trace!(command = %self.id, url, "Fetch deferred");
                        let command = Arc::clone(self);
                        deferred(FetchResolver::new(
                            url,
                            Box::new(move |fetched| command.resume(owner, fetched)),
                        ));
                    }
                    Err(e) => self.complete(engine, owner, Err(e), request.blocking),
                }
            }
        }
    }

    /// Continues a deferred fetch on whatever thread resolved it.
    fn resume(self: &Arc<Self>, owner: FlightOwner<R>, fetched: Result<Bytes, ResourceError>) {
        let Some(engine) = self.engine.upgrade() else {
            owner.complete(None);
            self.request.over(true);
            return;
        };
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.complete(&engine, owner, fetched, false);
        }));
        if let Err(panic) = result {
            self.fault(&engine, panic.as_ref());
        }
    }

    fn complete(
        self: &Arc<Self>,
        engine: &EngineShared<R>,
        owner: FlightOwner<R>,
        fetched: Result<Bytes, ResourceError>,
        inline: bool,
    ) {
        let url = owner.url().to_string();
        let request = &self.request;
        let decoded = fetched.and_then(|bytes| {
            trace!(command = %self.id, url = %url, len = bytes.len(), "Decoding resource");
            request.instructions.decode_bytes(&url, &bytes, &request.spec)
        });

        let payload = match decoded {
            Ok(resource) => {
                let payload = Arc::new(resource);
                engine.cache.put(url.as_str(), &payload);
                Some(payload)
            }
            Err(e) => {
                self.failed(engine, &e);
                None
            }
        };
        owner.complete(payload.clone());
        self.deliver(engine, &url, payload, true, inline);
    }

    fn failed(&self, engine: &EngineShared<R>, error: &ResourceError) {
        match error {
            ResourceError::Fetch { .. } => engine.stats.record_fetch_failure(),
            ResourceError::Decode { .. } => engine.stats.record_decode_failure(),
            ResourceError::OutOfMemory { .. } => {
                engine.stats.record_out_of_memory();
                warn!(command = %self.id, error = %error, "Out of memory, cleaning cache");
                let evicted = engine.cache.cleanup();
                debug!(command = %self.id, ?evicted, "Cleanup after out of memory finished");
                return;
            }
            ResourceError::Bind { .. } => {}
        }
        warn!(command = %self.id, error = %error, "Resource unavailable");
    }

    fn deliver(
        self: &Arc<Self>,
        engine: &EngineShared<R>,
        url: &str,
        payload: Option<Arc<R>>,
        downloaded: bool,
        inline: bool,
    ) {
        let success = payload.is_some();
        self.request.instructions.on_resource_ready(success, payload.as_ref());
        self.record(
            Classification::Downloaded { success },
            Some(url.to_string()),
            payload,
            downloaded,
        );
        self.schedule_end(engine, inline);
    }

    fn record(
        &self,
        classification: Classification,
        url: Option<String>,
        payload: Option<Arc<R>>,
        downloaded: bool,
    ) {
        trace!(command = %self.id, %classification, "Classified");
        let mut outcome = self.outcome.lock();
        outcome.classification = Some(classification);
        outcome.url = url;
        outcome.payload = payload;
        outcome.downloaded = downloaded;
    }

    fn schedule_end(self: &Arc<Self>, engine: &EngineShared<R>, inline: bool) {
        self.outcome.lock().phase = Phase::End;
        if inline || self.request.slot.is_none() {
            self.end(engine);
            return;
        }

        let command = Arc::clone(self);
        if !self.request.dispatcher.schedule(Box::new(move || command.run())) {
            warn!(command = %self.id, "Dispatcher refused bind");
            if let Some(slot) = &self.request.slot {
                engine.maps.remove_command(slot, self.id);
            }
            self.request.over(true);
        }
    }

    fn end(&self, engine: &EngineShared<R>) {
        let request = &self.request;
        let Some(slot) = &request.slot else {
            request.over(false);
            return;
        };
        if !engine.maps.is_latest(slot, self.id) {
            trace!(command = %self.id, slot = %slot, "Superseded before bind");
            request.over(true);
            return;
        }

        let (classification, url, payload, downloaded) = {
            let outcome = self.outcome.lock();
            (
                outcome.classification,
                outcome.url.clone(),
                outcome.payload.clone(),
                outcome.downloaded,
            )
        };
        let instructions = &request.instructions;

        match (classification, url, payload) {
            (Some(Classification::Local), _, _) => {
                instructions.on_bind_local(slot);
                retag(&engine.cache, slot, None);
                instructions.on_bound(slot, true);
            }
            (Some(Classification::NullTemporary), _, _) => {
                retag(&engine.cache, slot, None);
                instructions.on_bound(slot, false);
            }
            (_, Some(url), Some(payload)) => {
                let bound = match instructions.on_bind(slot, downloaded, Some(&payload)) {
                    Ok(bound) => bound,
                    Err(e) => {
                        self.failed(engine, &e);
                        false
                    }
                };
                if bound {
                    retag(&engine.cache, slot, Some(url));
                }
                instructions.on_bound(slot, bound);
            }
            _ => {
                if let Err(e) = instructions.on_bind(slot, downloaded, None) {
                    self.failed(engine, &e);
                }
                retag(&engine.cache, slot, None);
                instructions.on_bound(slot, false);
            }
        }

        engine.maps.remove_command(slot, self.id);
        trace!(command = %self.id, slot = %slot, "Command completed");
        request.over(false);
    }
}

/// Moves the slot's binding to `url`, keeping the cache's binding counts in step.
///
/// The new binding is counted before the old one is released, so rebinding
/// the same payload never drops its count to zero in between.
fn retag<R: Resource>(cache: &BoundedCache<R>, slot: &Slot, url: Option<String>) {
    let tag = url.map(|url| {
        let generation = cache.bind(&url);
        SlotTag::new(url, generation)
    });
    if let Some(SlotTag {
        url,
        generation: Some(generation),
    }) = slot.set_tag(tag)
    {
        cache.unbind(&url, generation);
    }
}
