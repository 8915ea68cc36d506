use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, VcsError};

/// A checked-out source tree for one run.
///
/// `path` is mounted as the application directory and `layers_path` as the
/// layer cache of every lifecycle phase. Neither is written by the
/// orchestrator itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub id: String,
    pub repository: String,
    pub reference: String,
    /// Resolved revision of `reference` at fetch time
    pub commit: Option<String>,
    pub path: PathBuf,
    pub layers_path: PathBuf,
    pub fetched_at: DateTime<Utc>,
}

impl SourceSnapshot {
    pub fn new(
        id: impl Into<String>,
        repository: impl Into<String>,
        reference: impl Into<String>,
        path: PathBuf,
        layers_path: PathBuf,
    ) -> Self {
        Self {
            id: id.into(),
            repository: repository.into(),
            reference: reference.into(),
            commit: None,
            path,
            layers_path,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Directory holding both the checkout and the layer cache.
    pub fn run_dir(&self) -> Option<&std::path::Path> {
        self.path.parent()
    }

    /// Short form of the resolved commit for display.
    pub fn short_commit(&self) -> Option<&str> {
        self.commit
            .as_deref()
            .map(|c| if c.len() > 12 { &c[..12] } else { c })
    }
}

/// Reject values the underlying tool would parse as options.
pub fn validate_argument(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(VcsError::InvalidReference(format!("{} is empty", kind)));
    }
    if value.starts_with('-') {
        return Err(VcsError::InvalidReference(format!(
            "{} must not start with '-': {}",
            kind, value
        )));
    }
    Ok(())
}

/// Materializes a source tree for a repository and ref.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Get the name of the provider backend
    fn name(&self) -> &'static str;

    /// Check if the backing tool is installed
    async fn is_available(&self) -> bool;

    /// Fetch `reference` of `repository` into a fresh, run-scoped directory
    async fn fetch(&self, repository: &str, reference: &str) -> Result<SourceSnapshot>;

    /// Remove everything `fetch` created for the snapshot
    async fn cleanup(&self, snapshot: &SourceSnapshot) -> Result<()>;
}
