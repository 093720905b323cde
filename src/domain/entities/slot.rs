//! Display slot handles.
//!
//! A slot is a reusable display element owned by the embedding UI. The engine
//! never looks inside it: identity comes from [`SlotTarget::slot_id`] and the
//! only state it touches is the tag remembering the last bound resource.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identity of a slot as reported by the underlying UI object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Resource last bound to a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotTag {
    /// Resource key.
    pub url: String,
    /// Cache generation of the bound payload, `None` if it was not cached.
    pub generation: Option<u64>,
}

impl SlotTag {
    /// Tag for `url` bound at `generation`.
    pub fn new(url: impl Into<String>, generation: Option<u64>) -> Self {
        Self {
            url: url.into(),
            generation,
        }
    }
}

/// Contract implemented by the UI object behind a slot.
pub trait SlotTarget: Send + Sync {
    /// Identity of the underlying UI object. Two slots are equal iff their ids are.
    fn slot_id(&self) -> SlotId;

    /// Returns the resource last bound to this slot.
    fn tag(&self) -> Option<SlotTag>;

    /// Replaces the remembered resource, returning the previous one.
    fn set_tag(&self, tag: Option<SlotTag>) -> Option<SlotTag>;
}

/// Cheaply clonable handle to a slot.
#[derive(Clone)]
pub struct Slot(Arc<dyn SlotTarget>);

impl Slot {
    /// Wraps a UI object.
    pub fn new(target: Arc<dyn SlotTarget>) -> Self {
        Self(target)
    }

    /// Creates a slot backed by a [`SlotCell`].
    #[must_use]
    pub fn cell(id: u64) -> Self {
        Self(Arc::new(SlotCell::new(SlotId(id))))
    }

    /// Returns the slot identity.
    #[must_use]
    pub fn id(&self) -> SlotId {
        self.0.slot_id()
    }

    /// Returns the resource last bound to this slot.
    #[must_use]
    pub fn tag(&self) -> Option<SlotTag> {
        self.0.tag()
    }

    /// Returns the key of the resource last bound to this slot.
    #[must_use]
    pub fn bound_url(&self) -> Option<String> {
        self.0.tag().map(|tag| tag.url)
    }

    /// Replaces the remembered resource, returning the previous one.
    pub fn set_tag(&self, tag: Option<SlotTag>) -> Option<SlotTag> {
        self.0.set_tag(tag)
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Slot {}

impl Hash for Slot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id())
            .field("tag", &self.tag())
            .finish()
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.id().fmt(f)
    }
}

/// Thread-safe standalone slot, for embedders without their own UI object.
#[derive(Debug)]
pub struct SlotCell {
    id: SlotId,
    tag: Mutex<Option<SlotTag>>,
}

impl SlotCell {
    /// Creates an untagged slot.
    #[must_use]
    pub const fn new(id: SlotId) -> Self {
        Self {
            id,
            tag: Mutex::new(None),
        }
    }
}

impl SlotTarget for SlotCell {
    fn slot_id(&self) -> SlotId {
        self.id
    }

    fn tag(&self) -> Option<SlotTag> {
        self.tag.lock().clone()
    }

    fn set_tag(&self, tag: Option<SlotTag>) -> Option<SlotTag> {
        std::mem::replace(&mut *self.tag.lock(), tag)
    }
}
