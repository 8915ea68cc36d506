//! RAII guard for build run lifecycle management.
//!
//! A run that is dropped or fails before it is marked completed reports
//! `pipeline.aborted` exactly once.

use tracing::{debug, warn};
use uuid::Uuid;

use events::Event;

use crate::core::OrderedEventEmitter;

/// RAII guard for a build run.
///
/// # Example
///
/// ```ignore
/// let mut guard = RunGuard::new(run_id, Some(emitter));
/// // ... fetch, run phases, export, import ...
/// guard.mark_completed(); // Must call this on success
/// // If not called, Drop will emit an aborted event
/// ```
pub struct RunGuard {
    run_id: Uuid,
    emitter: Option<OrderedEventEmitter>,
    completed: bool,
}

impl RunGuard {
    pub fn new(run_id: Uuid, emitter: Option<OrderedEventEmitter>) -> Self {
        debug!(run_id = %run_id, "Run guard created");

        Self {
            run_id,
            emitter,
            completed: false,
        }
    }

    /// Mark the run as completed successfully.
    pub fn mark_completed(&mut self) {
        debug!(run_id = %self.run_id, "Run marked as completed");
        self.completed = true;
    }

    /// Report the failure now instead of on drop.
    pub fn mark_failed(&mut self, reason: &str) {
        debug!(run_id = %self.run_id, reason = %reason, "Run marked as failed");

        self.emit_aborted(reason);
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn emit_aborted(&self, reason: &str) {
        if let Some(ref emitter) = self.emitter {
            emitter.emit(Event::PipelineAborted {
                run_id: self.run_id,
                reason: reason.to_string(),
            });
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                run_id = %self.run_id,
                "Run guard dropped without completion - emitting abort"
            );

            self.emit_aborted("Run terminated unexpectedly");
        }
    }
}
