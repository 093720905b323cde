//! Worker pools and dispatchers.

pub mod dispatcher;
pub mod worker_pool;

pub use dispatcher::{DispatchQueue, InlineDispatcher, QueueDispatcher, dispatch_channel};
pub use worker_pool::{Job, QueueOrder, WorkerPool, panic_message};
