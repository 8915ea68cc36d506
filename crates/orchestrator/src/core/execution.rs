//! Single-phase execution against the engine.

use cnb_core::ExecutionRequest;
use engine::{EngineError, ExecutionEnvironment, FilesystemHandle};
use tracing::{debug, warn};

use crate::cancel::CancelSignal;

/// How a phase execution ended.
#[derive(Debug)]
pub enum PhaseExecution {
    Completed(Result<FilesystemHandle, EngineError>),
    /// Cancellation won the race; the environment has been torn down
    Cancelled,
}

/// Run `request` to completion unless `cancel` fires first.
///
/// On cancellation the in-flight run future is dropped and the engine is asked
/// to abort the named environment before returning.
pub async fn execute_phase(
    engine: &dyn ExecutionEnvironment,
    cancel: &CancelSignal,
    request: &ExecutionRequest,
) -> PhaseExecution {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = engine.run(request) => Some(result),
    };

    match outcome {
        Some(result) => PhaseExecution::Completed(result),
        None => {
            debug!(environment = %request.name, "Cancellation requested, aborting");
            if let Err(e) = engine.abort(request).await {
                warn!(environment = %request.name, "Failed to abort environment: {}", e);
            }
            PhaseExecution::Cancelled
        }
    }
}
