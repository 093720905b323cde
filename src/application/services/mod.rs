pub mod binding_instructions;

pub use binding_instructions::{BindFn, BindingInstructions, PlaceholderFn, RequestEvent};
