//! Container engine seam of the pipeline.
//!
//! The orchestrator only talks to the traits in [`traits`]; [`DockerEngine`]
//! implements all three against the `docker` command-line client.

pub mod docker;
pub mod error;
pub mod traits;

pub use docker::DockerEngine;
pub use error::{EngineError, Result};
pub use traits::{ArtifactExporter, ArtifactImporter, ExecutionEnvironment, FilesystemHandle};
