//! Phase pipeline orchestration for buildpacks builds.
//!
//! [`BuildRunner`] fetches the source, drives the lifecycle phases one after
//! another through an [`engine::ExecutionEnvironment`], exports the final
//! filesystem as an image archive and loads it into the local runtime.

pub mod cancel;
pub mod core;
pub mod error;
pub mod handoff;
pub mod pipeline;
pub mod request;
pub mod resources;
pub mod runner;
pub mod state_machine;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use crate::core::{OrderedEventEmitter, PhaseRecord, PipelineOutput};
pub use error::{ErrorKind, OrchestratorError, Result};
pub use handoff::{export_artifact, export_artifact_until, import_artifact, PortableArtifact};
pub use pipeline::{run_pipeline, Pipeline, PipelineRun, Step};
pub use request::{PipelineSettings, RequestBuilder};
pub use runner::{BuildReport, BuildRequest, BuildRunner};
pub use state_machine::RunStateMachine;
