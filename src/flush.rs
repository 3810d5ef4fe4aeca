//! Force flush policy
//!
//! Runs an engine-wide flush on a dedicated worker thread. A request that
//! arrives while the previous flush is still running is skipped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::engine::Engine;
use crate::error::{Result, TsError};

const FLUSH_THREAD_NAME: &str = "force-flush";

/// Flushes everything on request, one flush at a time
#[derive(Default)]
pub struct ForceFlushPolicy {
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ForceFlushPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a flush of `engine` in the background.
    ///
    /// Returns `false` when the last flush is still running and nothing was
    /// started.
    pub fn execute(&self, engine: Arc<Engine>) -> Result<bool> {
        let mut worker = self.worker.lock();

        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                info!("Last flush is ongoing, skipping this request");
                return Ok(false);
            }
        }
        if let Some(handle) = worker.take() {
            report(handle);
        }

        let handle = thread::Builder::new()
            .name(FLUSH_THREAD_NAME.to_string())
            .spawn(move || {
                info!("force flush started");
                let result = engine.flush();
                match &result {
                    Ok(()) => info!("force flush finished"),
                    Err(e) => error!(error = %e, "force flush failed"),
                }
                result
            })?;
        *worker = Some(handle);
        Ok(true)
    }

    /// Whether a flush is running right now
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Wait for the current flush and return its result
    pub fn wait(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| TsError::WorkerPanicked(FLUSH_THREAD_NAME.to_string()))?,
            None => Ok(()),
        }
    }
}

/// Log the outcome of a finished worker nobody waited for
fn report(handle: JoinHandle<Result<()>>) {
    if handle.join().is_err() {
        error!("force flush worker panicked");
    }
}
