//! Per-slot bookkeeping deciding which command may bind.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::command::Command;
use crate::domain::entities::{CommandId, Resource, Slot};

/// The three per-slot maps. Each has its own lock and no method holds two
/// of them at once.
pub(crate) struct PriorityMaps<R: Resource> {
    latest: Mutex<HashMap<Slot, CommandId>>,
    pending_pre: Mutex<HashMap<Slot, Arc<Command<R>>>>,
    pending_download: Mutex<HashMap<Slot, Arc<Command<R>>>>,
}

impl<R: Resource> PriorityMaps<R> {
    pub(crate) fn new() -> Self {
        Self {
            latest: Mutex::new(HashMap::new()),
            pending_pre: Mutex::new(HashMap::new()),
            pending_download: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set_latest(&self, slot: &Slot, id: CommandId) {
        self.latest.lock().insert(slot.clone(), id);
    }

    /// Returns true if `id` is still the most recent command issued for `slot`.
    pub(crate) fn is_latest(&self, slot: &Slot, id: CommandId) -> bool {
        self.latest.lock().get(slot) == Some(&id)
    }

    pub(crate) fn take_pending_pre(&self, slot: &Slot) -> Option<Arc<Command<R>>> {
        self.pending_pre.lock().remove(slot)
    }

    pub(crate) fn insert_pending_pre(&self, slot: &Slot, command: Arc<Command<R>>) {
        self.pending_pre.lock().insert(slot.clone(), command);
    }

    pub(crate) fn insert_pending_download(&self, slot: &Slot, command: Arc<Command<R>>) {
        self.pending_download.lock().insert(slot.clone(), command);
    }

    pub(crate) fn remove_pending_pre_if(&self, slot: &Slot, id: CommandId) -> bool {
        remove_if(&self.pending_pre, slot, id)
    }

    pub(crate) fn remove_pending_download_if(&self, slot: &Slot, id: CommandId) -> bool {
        remove_if(&self.pending_download, slot, id)
    }

    /// Drops every trace of `id` so the slot is free for the next request.
    pub(crate) fn remove_command(&self, slot: &Slot, id: CommandId) {
        self.remove_pending_pre_if(slot, id);
        self.remove_pending_download_if(slot, id);
        let mut latest = self.latest.lock();
        if latest.get(slot) == Some(&id) {
            latest.remove(slot);
        }
    }

    pub(crate) fn clear(&self) {
        // Commands are dropped after the locks are released.
        let pre = std::mem::take(&mut *self.pending_pre.lock());
        let download = std::mem::take(&mut *self.pending_download.lock());
        self.latest.lock().clear();
        drop((pre, download));
    }

    pub(crate) fn pending_pre_len(&self) -> usize {
        self.pending_pre.lock().len()
    }

    pub(crate) fn pending_download_len(&self) -> usize {
        self.pending_download.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn latest_len(&self) -> usize {
        self.latest.lock().len()
    }
}

fn remove_if<R: Resource>(
    map: &Mutex<HashMap<Slot, Arc<Command<R>>>>,
    slot: &Slot,
    id: CommandId,
) -> bool {
    let mut map = map.lock();
    if map.get(slot).is_some_and(|command| command.id() == id) {
        map.remove(slot);
        return true;
    }
    false
}
