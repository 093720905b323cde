//! Domain error types.

mod engine_error;
mod resource_error;

pub use engine_error::EngineError;
pub use resource_error::ResourceError;
