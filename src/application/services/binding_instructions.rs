//! Ready-made [`Instructions`] assembled from a byte source, a decoder and a
//! bind callback.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::entities::{Resource, ResourceSpec, Slot, SlotId};
use crate::domain::errors::ResourceError;
use crate::domain::ports::{ByteSource, Fetched, Instructions, ResourceDecoder};

/// Shows a payload (or its absence) in a slot. Returns whether it was shown.
pub type BindFn<R> =
    dyn Fn(&Slot, bool, Option<&Arc<R>>) -> Result<bool, ResourceError> + Send + Sync;

/// Shows a placeholder in a slot.
pub type PlaceholderFn = dyn Fn(&Slot) + Send + Sync;

/// Progress of one request, reported over the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    /// The payload is known.
    Ready {
        /// Request uid.
        uid: Option<String>,
        /// Whether a payload is available.
        success: bool,
        /// Accounted size of the payload.
        size_bytes: Option<usize>,
    },
    /// A bind was attempted.
    Bound {
        /// Request uid.
        uid: Option<String>,
        /// Slot the bind targeted.
        slot: SlotId,
        /// Whether the payload is showing.
        success: bool,
    },
    /// The request finished.
    Over {
        /// Request uid.
        uid: Option<String>,
        /// Whether the request was superseded or failed hard.
        aborted: bool,
    },
}

impl RequestEvent {
    /// Returns the uid the event belongs to.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::Ready { uid, .. } | Self::Bound { uid, .. } | Self::Over { uid, .. } => {
                uid.as_deref()
            }
        }
    }
}

/// Instructions delegating fetch and decode to adapters and binding to a
/// closure.
///
/// One value is usually configured per view and then specialised per request
/// with [`BindingInstructions::for_request`] so events carry the request uid.
pub struct BindingInstructions<R: Resource> {
    source: Arc<dyn ByteSource>,
    decoder: Arc<dyn ResourceDecoder<R>>,
    bind: Arc<BindFn<R>>,
    placeholder: Option<Arc<PlaceholderFn>>,
    events: Option<mpsc::UnboundedSender<RequestEvent>>,
    uid: Option<String>,
}

impl<R: Resource> Clone for BindingInstructions<R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            decoder: Arc::clone(&self.decoder),
            bind: Arc::clone(&self.bind),
            placeholder: self.placeholder.clone(),
            events: self.events.clone(),
            uid: self.uid.clone(),
        }
    }
}

impl<R: Resource> BindingInstructions<R> {
    /// Fetches through `source`, decodes with `decoder` and shows payloads with `bind`.
    pub fn new<F>(
        source: Arc<dyn ByteSource>,
        decoder: Arc<dyn ResourceDecoder<R>>,
        bind: F,
    ) -> Self
    where
        F: Fn(&Slot, bool, Option<&Arc<R>>) -> Result<bool, ResourceError> + Send + Sync + 'static,
    {
        Self {
            source,
            decoder,
            bind: Arc::new(bind),
            placeholder: None,
            events: None,
            uid: None,
        }
    }

    /// Shows a placeholder while a resource loads or when there is none.
    #[must_use]
    pub fn with_placeholder<F>(mut self, placeholder: F) -> Self
    where
        F: Fn(&Slot) + Send + Sync + 'static,
    {
        self.placeholder = Some(Arc::new(placeholder));
        self
    }

    /// Reports request progress to `events`.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<RequestEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Copy of these instructions labelled with the request uid.
    #[must_use]
    pub fn for_request(&self, uid: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            uid: uid.map(ToOwned::to_owned),
            ..self.clone()
        })
    }

    fn emit(&self, event: RequestEvent) {
        if let Some(events) = &self.events
            && events.send(event).is_err()
        {
            trace!(uid = ?self.uid, "Event receiver gone");
        }
    }
}

impl<R: Resource> Instructions<R> for BindingInstructions<R> {
    fn has_temporary_resource(
        &self,
        _slot: Option<&Slot>,
        _uid: Option<&str>,
        _spec: &ResourceSpec,
    ) -> bool {
        self.placeholder.is_some()
    }

    fn on_bind_temporary(&self, slot: &Slot) {
        if let Some(placeholder) = &self.placeholder {
            placeholder(slot);
        }
    }

    fn fetch_bytes(&self, url: &str, spec: &ResourceSpec) -> Result<Fetched, ResourceError> {
        self.source.fetch(url, spec)
    }

    fn decode_bytes(&self, url: &str, bytes: &[u8], spec: &ResourceSpec) -> Result<R, ResourceError> {
        self.decoder.decode(url, bytes, spec)
    }

    fn on_resource_ready(&self, success: bool, payload: Option<&Arc<R>>) {
        self.emit(RequestEvent::Ready {
            uid: self.uid.clone(),
            success,
            size_bytes: payload.map(|payload| payload.size_bytes()),
        });
    }

    fn on_bind(
        &self,
        slot: &Slot,
        downloaded: bool,
        payload: Option<&Arc<R>>,
    ) -> Result<bool, ResourceError> {
        (self.bind)(slot, downloaded, payload)
    }

    fn on_bound(&self, slot: &Slot, success: bool) {
        self.emit(RequestEvent::Bound {
            uid: self.uid.clone(),
            slot: slot.id(),
            success,
        });
    }

    fn on_over(&self, aborted: bool) {
        self.emit(RequestEvent::Over {
            uid: self.uid.clone(),
            aborted,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::Engine;
    use crate::domain::entities::mocks::Blob;
    use crate::infrastructure::config::EngineConfig;
    use crate::infrastructure::scheduling::InlineDispatcher;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    struct StaticSource;

    impl ByteSource for StaticSource {
        fn fetch(&self, url: &str, _spec: &ResourceSpec) -> Result<Fetched, ResourceError> {
            if url.ends_with("missing.png") {
                return Err(ResourceError::fetch(url, "404"));
            }
            Ok(Fetched::Bytes(Bytes::from_static(b"blob")))
        }
    }

    struct BlobDecoder;

    impl ResourceDecoder<Blob> for BlobDecoder {
        fn decode(&self, url: &str, bytes: &[u8], _spec: &ResourceSpec) -> Result<Blob, ResourceError> {
            Ok(Blob::new(url, bytes.len()))
        }
    }

    fn instructions(shown: &Arc<Mutex<Vec<String>>>) -> BindingInstructions<Blob> {
        let shown = Arc::clone(shown);
        BindingInstructions::new(Arc::new(StaticSource), Arc::new(BlobDecoder), move |_, _, payload| {
            let Some(payload) = payload else {
                return Ok(false);
            };
            shown.lock().push(payload.label.clone());
            Ok(true)
        })
    }

    fn collect_until_over(rx: &mut mpsc::UnboundedReceiver<RequestEvent>) -> Vec<RequestEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            match rx.try_recv() {
                Ok(event) => {
                    let over = matches!(event, RequestEvent::Over { .. });
                    events.push(event);
                    if over {
                        break;
                    }
                }
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        events
    }

    #[test]
    fn test_reports_progress_through_events() {
        let shown = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let base = instructions(&shown).with_events(tx);
        let engine = Engine::<Blob>::new(EngineConfig::default()).unwrap();
        let url = "http://img/a.png";

        engine
            .get(
                Some(Slot::cell(3)),
                Some(url),
                ResourceSpec::default(),
                Arc::new(InlineDispatcher),
                base.for_request(Some(url)),
            )
            .unwrap();

        let events = collect_until_over(&mut rx);
        assert_eq!(
            events,
            vec![
                RequestEvent::Ready {
                    uid: Some(url.to_string()),
                    success: true,
                    size_bytes: Some(4)
                },
                RequestEvent::Bound {
                    uid: Some(url.to_string()),
                    slot: SlotId(3),
                    success: true
                },
                RequestEvent::Over {
                    uid: Some(url.to_string()),
                    aborted: false
                },
            ]
        );
        assert_eq!(shown.lock().clone(), vec![url.to_string()]);
    }

    #[test]
    fn test_failed_fetch_shows_placeholder() {
        let shown = Arc::new(Mutex::new(Vec::new()));
        let placeholders = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&placeholders);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let base = instructions(&shown)
            .with_placeholder(move |_| *counter.lock() += 1)
            .with_events(tx);
        let engine = Engine::<Blob>::new(EngineConfig::default()).unwrap();
        let url = "http://img/missing.png";

        engine
            .get(
                Some(Slot::cell(1)),
                Some(url),
                ResourceSpec::default(),
                Arc::new(InlineDispatcher),
                base.for_request(Some(url)),
            )
            .unwrap();

        let events = collect_until_over(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|event| event.uid() == Some(url)));
        assert!(matches!(events[1], RequestEvent::Bound { success: false, .. }));
        assert_eq!(*placeholders.lock(), 1);
        assert!(shown.lock().is_empty());
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let shown = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let instructions = instructions(&shown).with_events(tx);

        instructions.on_over(true);
    }
}
