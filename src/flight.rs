//! Single-flight execution guard.
//!
//! Serializes repeated invocations of one job (typically a connect or
//! replay routine): while a run is in flight, every further attempt is
//! rejected with [`SingleFlightError::AlreadyRunning`]. The slot reopens
//! the moment the run finishes, whatever the outcome, including panics
//! and aborts.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

/// Error type for guarded invocations.
#[derive(Debug, Error)]
pub enum SingleFlightError {
    /// A run was requested while the previous one is still in flight.
    #[error("{action} still running")]
    AlreadyRunning {
        /// The guard's action name.
        action: String,
    },

    /// The run was aborted or panicked before producing its output.
    #[error("{action} aborted before completing")]
    Aborted {
        /// The guard's action name.
        action: String,
        /// Join failure of the underlying task.
        #[source]
        source: JoinError,
    },
}

/// Admission guard allowing at most one in-flight run of an action.
///
/// The guard carries no result state of its own. Each admitted run hands
/// back a fresh [`FlightHandle`]; the busy flag flips back as a side
/// effect of the run's task finishing, so no cooperation from the caller
/// is needed to reopen the slot.
#[derive(Debug)]
pub struct SingleFlight {
    /// Action name used in diagnostics and error text.
    action: String,
    /// Busy flag, shared with the task of the in-flight run.
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    /// Create a guard for the named action.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The guarded action's name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Whether a run is currently in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Admit `job` as the action's one in-flight run.
    ///
    /// The busy flag flips synchronously, before this call returns, so a
    /// caller that is rejected was truly concurrent with an admitted run.
    /// The job itself starts on a spawned task; the flag clears when that
    /// task finishes, before the returned handle resolves.
    ///
    /// # Errors
    ///
    /// [`SingleFlightError::AlreadyRunning`] if a run is already in
    /// flight.
    pub fn call<F>(&self, job: F) -> Result<FlightHandle<F::Output>, SingleFlightError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SingleFlightError::AlreadyRunning {
                action: self.action.clone(),
            });
        }
        tracing::debug!(action = %self.action, "run admitted");
        let reset = ResetOnDrop(Arc::clone(&self.running));
        let task = tokio::spawn(async move {
            // The task owns the reset guard; it drops on every exit path.
            let _reset = reset;
            job.await
        });
        Ok(FlightHandle {
            action: self.action.clone(),
            task,
        })
    }
}

/// Clears the busy flag when the run's task unwinds, completes, or is
/// dropped by an abort.
struct ResetOnDrop(Arc<AtomicBool>);

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to one admitted run.
#[derive(Debug)]
pub struct FlightHandle<T> {
    action: String,
    task: JoinHandle<T>,
}

impl<T> FlightHandle<T> {
    /// The action this run belongs to.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Whether the run has finished (its output may still be unclaimed).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Abort the run. The guard's slot reopens once the task winds down.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Await the run's output.
    ///
    /// # Errors
    ///
    /// [`SingleFlightError::Aborted`] if the run panicked or was aborted.
    pub async fn join(self) -> Result<T, SingleFlightError> {
        let Self { action, task } = self;
        task.await
            .map_err(|source| SingleFlightError::Aborted { action, source })
    }
}
