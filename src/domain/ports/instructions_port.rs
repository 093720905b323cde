//! Per-request collaborator contract.
//!
//! The engine drives a request through these callbacks. `on_bind_local`,
//! `on_bind_temporary`, `on_bind` and `on_bound` always run on the request's
//! dispatcher (or on the calling thread for blocking requests); the others run
//! on whatever thread the pipeline happens to be on.

use std::sync::Arc;

use bytes::Bytes;

use crate::domain::entities::{Resource, ResourceSpec, Slot};
use crate::domain::errors::ResourceError;

/// Completion callback behind a [`FetchResolver`].
pub type ResolveFn = Box<dyn FnOnce(Result<Bytes, ResourceError>) + Send + 'static>;

/// Deferred fetch body: receives the resolver and must eventually resolve it.
pub type DeferredFetch = Box<dyn FnOnce(FetchResolver) + Send + 'static>;

/// Handle used by a deferred fetch to resume the pipeline.
///
/// Dropping an unresolved resolver completes the request as a fetch failure.
pub struct FetchResolver {
    url: String,
    complete: Option<ResolveFn>,
}

impl FetchResolver {
    /// Creates a resolver around a completion callback.
    pub fn new(url: impl Into<String>, complete: ResolveFn) -> Self {
        Self {
            url: url.into(),
            complete: Some(complete),
        }
    }

    /// URL whose bytes are awaited.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resumes the pipeline with the fetched bytes or the fetch error.
    pub fn resolve(mut self, result: Result<Bytes, ResourceError>) {
        if let Some(complete) = self.complete.take() {
            complete(result);
        }
    }
}

impl Drop for FetchResolver {
    fn drop(&mut self) {
        if let Some(complete) = self.complete.take() {
            complete(Err(ResourceError::fetch(
                self.url.clone(),
                "resolver dropped without a result",
            )));
        }
    }
}

impl std::fmt::Debug for FetchResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResolver")
            .field("url", &self.url)
            .field("pending", &self.complete.is_some())
            .finish()
    }
}

/// Outcome of a fetch request.
pub enum Fetched {
    /// Bytes are available now.
    Bytes(Bytes),
    /// Bytes will be delivered later through a [`FetchResolver`].
    Later(DeferredFetch),
}

impl Fetched {
    /// Wraps a deferred fetch body.
    pub fn later(fetch: impl FnOnce(FetchResolver) + Send + 'static) -> Self {
        Self::Later(Box::new(fetch))
    }
}

impl std::fmt::Debug for Fetched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Later(_) => f.write_str("Later"),
        }
    }
}

/// Port for retrieving raw resource bytes.
pub trait ByteSource: Send + Sync {
    /// Fetches the bytes behind `url`.
    ///
    /// # Errors
    /// Returns [`ResourceError::Fetch`] when the resource cannot be reached.
    fn fetch(&self, url: &str, spec: &ResourceSpec) -> Result<Fetched, ResourceError>;
}

/// Port for turning bytes into a decoded resource.
pub trait ResourceDecoder<R: Resource>: Send + Sync {
    /// Decodes `bytes` fetched from `url`.
    ///
    /// # Errors
    /// Returns [`ResourceError::Decode`] for unusable bytes and
    /// [`ResourceError::OutOfMemory`] when the decoded size cannot be allocated.
    fn decode(&self, url: &str, bytes: &[u8], spec: &ResourceSpec) -> Result<R, ResourceError>;
}

/// Callbacks the engine invokes for one request.
pub trait Instructions<R: Resource>: Send + Sync {
    /// Returns true if the collaborator can show the resource without the engine.
    fn has_local_resource(&self, _slot: Option<&Slot>, _uid: Option<&str>, _spec: &ResourceSpec) -> bool {
        false
    }

    /// Shows the locally available resource.
    fn on_bind_local(&self, _slot: &Slot) {}

    /// Returns true if a placeholder should be shown while the resource loads.
    fn has_temporary_resource(
        &self,
        _slot: Option<&Slot>,
        _uid: Option<&str>,
        _spec: &ResourceSpec,
    ) -> bool {
        false
    }

    /// Shows the placeholder.
    fn on_bind_temporary(&self, _slot: &Slot) {}

    /// Maps the request uid to a resource key. `None` means "no resource".
    fn compute_resource_key(&self, uid: Option<&str>, _spec: &ResourceSpec) -> Option<String> {
        uid.filter(|uid| !uid.is_empty()).map(ToOwned::to_owned)
    }

    /// Fetches the bytes for a resource key.
    ///
    /// # Errors
    /// Any error is logged and the request continues with a null payload.
    fn fetch_bytes(&self, url: &str, spec: &ResourceSpec) -> Result<Fetched, ResourceError>;

    /// Decodes fetched bytes.
    ///
    /// # Errors
    /// Any error is logged and the request continues with a null payload.
    fn decode_bytes(&self, url: &str, bytes: &[u8], spec: &ResourceSpec) -> Result<R, ResourceError>;

    /// Called once the payload is known, before binding.
    fn on_resource_ready(&self, _success: bool, _payload: Option<&Arc<R>>) {}

    /// Binds the payload (or the lack of one) to the slot. Returns whether
    /// the bind succeeded.
    ///
    /// # Errors
    /// [`ResourceError::OutOfMemory`] triggers a cache cleanup; any error
    /// counts as an unsuccessful bind.
    fn on_bind(
        &self,
        slot: &Slot,
        downloaded: bool,
        payload: Option<&Arc<R>>,
    ) -> Result<bool, ResourceError>;

    /// Called after a bind attempt.
    fn on_bound(&self, _slot: &Slot, _success: bool) {}

    /// Terminal notification, delivered exactly once per request.
    fn on_over(&self, _aborted: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dropped_resolver_reports_fetch_failure() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let resolver = FetchResolver::new(
            "http://img/a.png",
            Box::new(move |result| *sink.lock() = Some(result)),
        );
        drop(resolver);

        let result = seen.lock().take();
        assert!(matches!(result, Some(Err(ResourceError::Fetch { .. }))));
    }

    #[test]
    fn test_resolver_completes_once() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let resolver = FetchResolver::new(
            "http://img/a.png",
            Box::new(move |_| *counter.lock() += 1),
        );
        resolver.resolve(Ok(Bytes::from_static(b"png")));

        assert_eq!(*calls.lock(), 1);
    }
}
