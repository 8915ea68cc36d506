use async_trait::async_trait;
use cnb_core::ExecutionRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Opaque reference to the stopped environment holding a phase's filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilesystemHandle(String);

impl FilesystemHandle {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() || id.starts_with('-') {
            return Err(EngineError::InvalidHandle(id));
        }
        Ok(Self(id))
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FilesystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates isolated environments and runs them to completion.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Get the name of the engine backend
    fn name(&self) -> &'static str;

    /// Run the request to completion.
    ///
    /// A zero exit yields the handle of the stopped environment; anything
    /// else is an error and leaves no environment behind.
    async fn run(&self, request: &ExecutionRequest) -> Result<FilesystemHandle>;

    /// Release a handle that is no longer needed
    async fn discard(&self, handle: &FilesystemHandle) -> Result<()>;

    /// Tear down the environment started for `request`, if it still exists
    async fn abort(&self, request: &ExecutionRequest) -> Result<()>;
}

/// Serializes a filesystem handle to an image archive.
#[async_trait]
pub trait ArtifactExporter: Send + Sync {
    /// Write the archive for `handle`, tagged as `image`, to `path`
    async fn export(&self, handle: &FilesystemHandle, path: &Path, image: &str) -> Result<()>;
}

/// Loads an image archive into a reachable runtime.
#[async_trait]
pub trait ArtifactImporter: Send + Sync {
    /// Load the archive at `path`, returning the runtime's status output
    async fn import(&self, path: &Path) -> Result<String>;
}
