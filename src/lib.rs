//! Slotimage - slot-aware image loading.
//!
//! This crate fetches, decodes and caches images and binds them to reusable
//! display slots. Requests for the same slot coalesce so only the latest one
//! binds, concurrent downloads of one URL are shared, and the decoded cache
//! stays within configurable water marks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the engine facade and collaborators.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, pools and adapters.
pub mod infrastructure;

pub use application::{Engine, EngineBuilder};
pub use domain::{Dispatcher, EngineError, Instructions, Resource, ResourceError, ResourceSpec, Slot};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "slotimage";
