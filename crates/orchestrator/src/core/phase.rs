use chrono::{DateTime, Utc};
use engine::FilesystemHandle;
use serde::Serialize;
use std::time::Duration;

/// A phase that ran to completion.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseRecord {
    pub index: usize,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Result of a pipeline whose every phase succeeded.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Filesystem state left by the last phase; earlier handles are released
    pub handle: FilesystemHandle,
    pub phases: Vec<PhaseRecord>,
    pub duration: Duration,
}

impl PipelineOutput {
    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }
}
