//! Domain entity definitions.

mod command;
mod resource;
mod slot;

pub use command::{Classification, CommandId, Phase};
pub use resource::{Resource, ResourceSpec};
pub use slot::{Slot, SlotCell, SlotId, SlotTag, SlotTarget};

#[cfg(test)]
pub mod mocks {
    pub use super::resource::mock::Blob;
}
