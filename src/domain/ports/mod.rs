mod diagnostics_port;
mod dispatcher_port;
mod instructions_port;

pub use diagnostics_port::{DiagnosticsListener, EngineDiagnostics};
pub use dispatcher_port::{DispatchTask, Dispatcher};
pub use instructions_port::{
    ByteSource, DeferredFetch, FetchResolver, Fetched, Instructions, ResolveFn, ResourceDecoder,
};

#[cfg(test)]
pub mod mocks {
    pub use super::dispatcher_port::mock::ManualDispatcher;
}
