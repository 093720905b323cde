//! Application layer with the engine facade and ready-made collaborators.

/// Engine facade and command pipeline.
pub mod engine;
/// Collaborator implementations.
pub mod services;

pub use engine::{Engine, EngineBuilder};
pub use services::{BindingInstructions, RequestEvent};
