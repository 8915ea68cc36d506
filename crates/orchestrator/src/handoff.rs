//! Export of the final filesystem and import into the local runtime.

use engine::{ArtifactExporter, ArtifactImporter, EngineError, FilesystemHandle};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::error::{OrchestratorError, Result};

const PARTIAL_SUFFIX: &str = ".partial";

/// Stage name reported when a build is cancelled while exporting.
const EXPORT_STAGE: &str = "export";

/// An image archive written by [`export_artifact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortableArtifact {
    pub path: PathBuf,
    /// Reference the archived image is tagged with
    pub image: String,
    pub size_bytes: u64,
}

/// `<file name>.partial` next to `path`.
pub fn partial_path(path: &Path) -> Option<PathBuf> {
    let mut name: OsString = path.file_name()?.to_owned();
    name.push(PARTIAL_SUFFIX);
    Some(path.with_file_name(name))
}

/// Image reference derived from the archive name, e.g. `./app.tar` -> `app:latest`.
pub fn default_image_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| {
            s.chars()
                .map(|c| match c {
                    'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
                    'A'..='Z' => c.to_ascii_lowercase(),
                    _ => '-',
                })
                .collect::<String>()
        })
        .filter(|s| !s.is_empty() && !s.starts_with(['.', '-', '_']))
        .unwrap_or_else(|| "cnb-build".to_string());
    format!("{}:latest", stem)
}

/// Write the archive for `handle` to `path`.
///
/// The exporter writes to a sibling `.partial` file that is renamed over
/// `path` once complete, so a failed export never leaves a truncated archive.
pub async fn export_artifact(
    exporter: &dyn ArtifactExporter,
    handle: &FilesystemHandle,
    path: &Path,
    image: &str,
) -> Result<PortableArtifact> {
    export_artifact_until(exporter, handle, path, image, &CancelSignal::never()).await
}

/// [`export_artifact`] that gives up when `cancel` fires.
///
/// A cancelled export removes the `.partial` file and never replaces `path`.
pub async fn export_artifact_until(
    exporter: &dyn ArtifactExporter,
    handle: &FilesystemHandle,
    path: &Path,
    image: &str,
    cancel: &CancelSignal,
) -> Result<PortableArtifact> {
    let partial = partial_path(path).ok_or_else(|| {
        OrchestratorError::Export(EngineError::InvalidPath(path.display().to_string()))
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OrchestratorError::Export(e.into()))?;
    }

    info!(handle = %handle, path = %path.display(), image = %image, "Exporting image archive");

    let exported = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = exporter.export(handle, &partial, image) => Some(result),
    };

    match exported {
        Some(Ok(())) if !cancel.is_cancelled() => {}
        Some(Err(e)) => {
            remove_partial(&partial).await;
            return Err(OrchestratorError::Export(e));
        }
        _ => {
            warn!(path = %path.display(), "Export cancelled");
            remove_partial(&partial).await;
            return Err(OrchestratorError::cancelled(Some(EXPORT_STAGE)));
        }
    }

    if let Err(e) = tokio::fs::rename(&partial, path).await {
        remove_partial(&partial).await;
        return Err(OrchestratorError::Export(e.into()));
    }

    let size_bytes = tokio::fs::metadata(path)
        .await
        .map_err(|e| OrchestratorError::Export(e.into()))?
        .len();

    info!(path = %path.display(), size_bytes, "Image archive written");
    Ok(PortableArtifact {
        path: path.to_path_buf(),
        image: image.to_string(),
        size_bytes,
    })
}

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!("Removed {:?}", partial),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", partial, e),
    }
}

/// Load the archive at `path`; needs nothing but the file.
pub async fn import_artifact(importer: &dyn ArtifactImporter, path: &Path) -> Result<String> {
    info!(path = %path.display(), "Loading image archive");

    let status = importer
        .import(path)
        .await
        .map_err(|source| OrchestratorError::Import {
            path: path.to_path_buf(),
            source,
        })?;

    info!(path = %path.display(), status = %status, "Image loaded");
    Ok(status)
}
