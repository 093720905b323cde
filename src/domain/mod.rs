//! Domain layer with core entities, errors and collaborator ports.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{Resource, ResourceSpec, Slot, SlotId, SlotTag};
pub use errors::{EngineError, ResourceError};
pub use ports::{Dispatcher, Instructions};
