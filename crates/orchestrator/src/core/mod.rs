//! Building blocks of the phase pipeline.
//!
//! - [`OrderedEventEmitter`] - Event emitter with per-run sequence numbers
//! - [`execute_phase`] - Runs one request against the engine, honouring cancellation
//! - [`PhaseRecord`] / [`PipelineOutput`] - What a successful run leaves behind

mod events;
mod execution;
mod phase;

pub use events::OrderedEventEmitter;
pub use execution::{execute_phase, PhaseExecution};
pub use phase::{PhaseRecord, PipelineOutput};
