//! Domain types shared by every crate of the buildpacks pipeline.

pub mod domain;
pub mod error;

pub use domain::phase::{LifecycleMode, LifecyclePlan, PhaseSpec, LIFECYCLE_DIR};
pub use domain::request::{ExecutionRequest, Mount, UserMode};
pub use domain::run::RunState;
pub use error::{CoreError, Result};
