//! Decoded resource abstraction and per-request decode hints.

/// A decoded resource that can be cached and bound to a slot.
///
/// The cache accounts memory with [`Resource::size_bytes`], which must be
/// deterministic for the lifetime of the value.
pub trait Resource: Send + Sync + 'static {
    /// Returns the memory footprint of the decoded resource in bytes.
    fn size_bytes(&self) -> usize;

    /// Releases application-managed backing storage.
    ///
    /// Called by eviction when recycling is enabled and no slot is bound to
    /// the resource. The default does nothing.
    fn recycle(&self) {}
}

/// Opaque decode hints that travel with a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Maximum width the decoded resource should have.
    pub max_width: Option<u32>,
    /// Maximum height the decoded resource should have.
    pub max_height: Option<u32>,
}

impl ResourceSpec {
    /// Creates a spec without any constraint.
    #[must_use]
    pub const fn unconstrained() -> Self {
        Self {
            max_width: None,
            max_height: None,
        }
    }

    /// Sets the bounding box the decoded resource must fit in.
    #[must_use]
    pub const fn with_bounds(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Returns true if decoding should downscale a resource of the given size.
    #[must_use]
    pub fn exceeds(&self, width: u32, height: u32) -> bool {
        self.max_width.is_some_and(|w| width > w) || self.max_height.is_some_and(|h| height > h)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconstrained_never_exceeds() {
        let spec = ResourceSpec::unconstrained();
        assert!(!spec.exceeds(10_000, 10_000));
    }

    #[test]
    fn test_bounds_exceeded_on_either_axis() {
        let spec = ResourceSpec::default().with_bounds(400, 300);
        assert!(spec.exceeds(401, 10));
        assert!(spec.exceeds(10, 301));
        assert!(!spec.exceeds(400, 300));
    }
}
