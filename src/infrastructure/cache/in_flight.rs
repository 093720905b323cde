//! Registry of downloads in flight, keyed by URL.
//!
//! The first requester of a URL becomes the owner and performs the fetch;
//! later requesters wait on the record's condvar and reuse the published
//! result. A record leaves the registry once every participant released it,
//! or as soon as its owner publishes a failure so the next requester retries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::domain::entities::Resource;

/// Shared result slot of one download.
pub struct InFlightDownload<R> {
    result: Mutex<Option<Option<Arc<R>>>>,
    published: Condvar,
}

impl<R> InFlightDownload<R> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            published: Condvar::new(),
        }
    }

    /// Publishes the payload and wakes every waiter. Only the first call counts.
    fn publish(&self, payload: Option<Arc<R>>) {
        let mut result = self.result.lock();
        if result.is_none() {
            *result = Some(payload);
            self.published.notify_all();
        }
    }

    fn wait(&self) -> Option<Arc<R>> {
        let mut result = self.result.lock();
        loop {
            if let Some(payload) = result.as_ref() {
                return payload.clone();
            }
            self.published.wait(&mut result);
        }
    }

    /// Returns true once a result has been published.
    pub fn is_published(&self) -> bool {
        self.result.lock().is_some()
    }

    fn failed(&self) -> bool {
        matches!(*self.result.lock(), Some(None))
    }
}

struct Record<R> {
    flight: Arc<InFlightDownload<R>>,
    references: usize,
}

/// Outcome of joining the registry for a URL.
pub enum Joined<R: Resource> {
    /// The resource reached the cache meanwhile.
    Cached(Arc<R>),
    /// The caller must fetch and complete the download.
    Owner(FlightOwner<R>),
    /// Another requester is fetching; wait for its result.
    Waiter(FlightWaiter<R>),
}

/// URL-keyed registry of pending downloads. Clones share the same registry.
pub struct InFlightRegistry<R> {
    records: Arc<Mutex<HashMap<String, Record<R>>>>,
}

impl<R> Clone for InFlightRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<R: Resource> Default for InFlightRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> InFlightRegistry<R> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Joins the download of `url`.
    ///
    /// `cached` is consulted under the registry lock before registering a new
    /// download, so a download that completed between the caller's cache
    /// lookup and this call is not repeated.
    pub fn join(&self, url: &str, cached: impl FnOnce() -> Option<Arc<R>>) -> Joined<R> {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(url) {
            record.references += 1;
            trace!(url, references = record.references, "Joined download in flight");
            return Joined::Waiter(FlightWaiter {
                registry: self.clone(),
                url: url.to_string(),
                flight: Arc::clone(&record.flight),
            });
        }

        if let Some(payload) = cached() {
            return Joined::Cached(payload);
        }

        let flight = Arc::new(InFlightDownload::new());
        records.insert(
            url.to_string(),
            Record {
                flight: Arc::clone(&flight),
                references: 1,
            },
        );
        trace!(url, "Registered download in flight");
        Joined::Owner(FlightOwner {
            registry: self.clone(),
            url: url.to_string(),
            flight,
        })
    }

    fn release(&self, url: &str, flight: &Arc<InFlightDownload<R>>) {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(url) else {
            return;
        };
        if !Arc::ptr_eq(&record.flight, flight) {
            return;
        }
        record.references = record.references.saturating_sub(1);
        if record.references == 0 {
            records.remove(url);
            trace!(url, "Download in flight retired");
        }
    }

    /// Removes the record of a failed download while waiters may still hold it.
    fn retire(&self, url: &str, flight: &Arc<InFlightDownload<R>>) {
        let mut records = self.records.lock();
        if records.get(url).is_some_and(|record| Arc::ptr_eq(&record.flight, flight)) {
            records.remove(url);
            trace!(url, "Failed download retired");
        }
    }

    /// Number of URLs with a download in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every record. Participants still holding a record finish normally.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

/// Ownership of a download. Dropping it without completing publishes a null
/// result so waiters never hang.
pub struct FlightOwner<R: Resource> {
    registry: InFlightRegistry<R>,
    url: String,
    flight: Arc<InFlightDownload<R>>,
}

impl<R: Resource> FlightOwner<R> {
    /// URL being downloaded.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Publishes the result to every waiter and releases the owner's reference.
    pub fn complete(self, payload: Option<Arc<R>>) {
        self.flight.publish(payload);
    }
}

impl<R: Resource> Drop for FlightOwner<R> {
    fn drop(&mut self) {
        self.flight.publish(None);
        if self.flight.failed() {
            self.registry.retire(&self.url, &self.flight);
        } else {
            self.registry.release(&self.url, &self.flight);
        }
    }
}

/// Participation in someone else's download.
pub struct FlightWaiter<R: Resource> {
    registry: InFlightRegistry<R>,
    url: String,
    flight: Arc<InFlightDownload<R>>,
}

impl<R: Resource> FlightWaiter<R> {
    /// Blocks until the owner publishes, then releases this reference.
    #[must_use]
    pub fn wait(self) -> Option<Arc<R>> {
        self.flight.wait()
    }
}

impl<R: Resource> Drop for FlightWaiter<R> {
    fn drop(&mut self) {
        self.registry.release(&self.url, &self.flight);
    }
}
