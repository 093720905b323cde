//! Background thread delivering periodic diagnostics.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::domain::errors::EngineError;
use crate::domain::ports::{DiagnosticsListener, EngineDiagnostics};

/// Periodically samples diagnostics and hands them to a listener.
///
/// Sampling stops when [`DiagnosticsReporter::stop`] is called or the sampler
/// returns `None`.
pub struct DiagnosticsReporter {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DiagnosticsReporter {
    /// Starts the reporter thread.
    ///
    /// # Errors
    /// Returns [`EngineError::WorkerSpawn`] if the thread cannot be created.
    pub fn spawn<F>(
        interval: Duration,
        listener: Arc<dyn DiagnosticsListener>,
        sample: F,
    ) -> Result<Self, EngineError>
    where
        F: Fn() -> Option<EngineDiagnostics> + Send + 'static,
    {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("diagnostics".to_string())
            .spawn(move || {
                let (stopped, wake) = &*signal;
                loop {
                    {
                        let mut stopped = stopped.lock();
                        if !*stopped {
                            wake.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    let Some(diagnostics) = sample() else {
                        break;
                    };
                    listener.on_diagnostics(&diagnostics);
                }
                debug!("Diagnostics reporter stopped");
            })
            .map_err(|e| EngineError::worker_spawn("diagnostics", e))?;

        Ok(Self {
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stops the reporter and waits for its thread.
    pub fn stop(&self) {
        let (stopped, wake) = &*self.stop;
        *stopped.lock() = true;
        wake.notify_all();

        if let Some(handle) = self.handle.lock().take()
            && handle.thread().id() != thread::current().id()
            && handle.join().is_err()
        {
            error!("Diagnostics reporter terminated abnormally");
        }
    }
}

impl Drop for DiagnosticsReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
