//! End-to-end build: fetch, lifecycle phases, export, import.

use cnb_core::LifecycleMode;
use engine::{ArtifactExporter, ArtifactImporter, DockerEngine, ExecutionEnvironment};
use events::{Event, EventBus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;
use vcs::{SourceProvider, SourceSnapshot};

use crate::cancel::CancelSignal;
use crate::core::{OrderedEventEmitter, PhaseRecord, PipelineOutput};
use crate::error::{OrchestratorError, Result};
use crate::handoff::{default_image_name, export_artifact_until, import_artifact, PortableArtifact};
use crate::pipeline::Pipeline;
use crate::request::{PipelineSettings, RequestBuilder};
use crate::resources::RunGuard;

const FETCH_STAGE: &str = "fetch";
const IMPORT_STAGE: &str = "import";

/// What to build and where the archive goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub repository: String,
    pub reference: String,
    pub mode: LifecycleMode,
    pub archive_path: PathBuf,
    /// Reference the exported image is tagged with
    pub image: String,
}

impl BuildRequest {
    pub fn new(
        repository: impl Into<String>,
        reference: impl Into<String>,
        archive_path: impl Into<PathBuf>,
    ) -> Self {
        let archive_path = archive_path.into();
        Self {
            repository: repository.into(),
            reference: reference.into(),
            mode: LifecycleMode::default(),
            image: default_image_name(&archive_path),
            archive_path,
        }
    }

    pub fn with_mode(mut self, mode: LifecycleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }
}

/// Summary of a build whose image was loaded.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub run_id: Uuid,
    pub snapshot: SourceSnapshot,
    pub artifact: PortableArtifact,
    pub phases: Vec<PhaseRecord>,
    pub import_status: String,
    pub duration: Duration,
}

/// Drives one build at a time through every stage.
pub struct BuildRunner {
    source: Arc<dyn SourceProvider>,
    engine: Arc<dyn ExecutionEnvironment>,
    exporter: Arc<dyn ArtifactExporter>,
    importer: Arc<dyn ArtifactImporter>,
    settings: PipelineSettings,
    event_bus: EventBus,
    keep_sources: bool,
}

impl BuildRunner {
    pub fn new(
        source: Arc<dyn SourceProvider>,
        engine: Arc<dyn ExecutionEnvironment>,
        exporter: Arc<dyn ArtifactExporter>,
        importer: Arc<dyn ArtifactImporter>,
        settings: PipelineSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            source,
            engine,
            exporter,
            importer,
            settings,
            event_bus,
            keep_sources: true,
        }
    }

    /// Use one docker client for execution, export and import.
    pub fn with_docker(
        source: Arc<dyn SourceProvider>,
        docker: DockerEngine,
        settings: PipelineSettings,
        event_bus: EventBus,
    ) -> Self {
        let docker = Arc::new(docker);
        Self::new(
            source,
            docker.clone(),
            docker.clone(),
            docker,
            settings,
            event_bus,
        )
    }

    /// Keep the checkout after a successful build (default `true`).
    pub fn with_keep_sources(mut self, keep: bool) -> Self {
        self.keep_sources = keep;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Run every stage for `request`.
    ///
    /// Stops at the first failing stage. The archive only exists once export
    /// succeeded and is left in place when import fails.
    pub async fn build(&self, request: &BuildRequest, cancel: CancelSignal) -> Result<BuildReport> {
        self.settings.validate()?;
        let plan = self.settings.plan(request.mode);

        let run_id = Uuid::new_v4();
        let emitter = OrderedEventEmitter::new(self.event_bus.clone());
        let mut guard = RunGuard::new(run_id, Some(emitter.clone()));
        let started = Instant::now();

        info!(
            run_id = %run_id,
            repository = %request.repository,
            reference = %request.reference,
            mode = request.mode.as_str(),
            "Build started"
        );

        let result = self
            .run_stages(run_id, request, &plan, &emitter, cancel)
            .await;

        match result {
            Ok((snapshot, output, artifact, import_status)) => {
                guard.mark_completed();
                if !self.keep_sources {
                    if let Err(e) = self.source.cleanup(&snapshot).await {
                        warn!(run_id = %run_id, "Failed to remove checkout: {}", e);
                    }
                }

                let duration = started.elapsed();
                info!(
                    run_id = %run_id,
                    archive = %artifact.path.display(),
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "Build finished"
                );
                Ok(BuildReport {
                    run_id,
                    snapshot,
                    artifact,
                    phases: output.phases,
                    import_status,
                    duration,
                })
            }
            Err(e) => {
                guard.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        request: &BuildRequest,
        plan: &cnb_core::LifecyclePlan,
        emitter: &OrderedEventEmitter,
        cancel: CancelSignal,
    ) -> Result<(SourceSnapshot, PipelineOutput, PortableArtifact, String)> {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::cancelled(None));
        }

        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OrchestratorError::cancelled(Some(FETCH_STAGE))),
            fetched = self.source.fetch(&request.repository, &request.reference) => fetched?,
        };
        emitter.emit(Event::SourceFetched {
            run_id,
            repository: snapshot.repository.clone(),
            reference: snapshot.reference.clone(),
            commit: snapshot.commit.clone(),
            path: snapshot.path.display().to_string(),
        });

        let requests = RequestBuilder::new(&self.settings, &snapshot, run_id);
        let output = Pipeline::new(self.engine.as_ref(), plan, requests)
            .with_cancel(cancel.clone())
            .with_emitter(emitter.clone())
            .start()
            .run_to_completion()
            .await?;

        let exported = export_artifact_until(
            self.exporter.as_ref(),
            &output.handle,
            &request.archive_path,
            &request.image,
            &cancel,
        )
        .await;

        // The archive is self-contained; the final environment is not needed past export.
        if let Err(e) = self.engine.discard(&output.handle).await {
            warn!(handle = %output.handle, "Failed to discard final handle: {}", e);
        }

        let artifact = exported?;
        emitter.emit(Event::ArtifactExported {
            run_id,
            path: artifact.path.display().to_string(),
            size_bytes: artifact.size_bytes,
        });

        // A cancelled import leaves the archive for `cnb-build import`.
        let import_status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OrchestratorError::cancelled(Some(IMPORT_STAGE))),
            status = self.import_with(emitter, &artifact.path) => status?,
        };
        Ok((snapshot, output, artifact, import_status))
    }

    /// Load an existing archive without building anything.
    pub async fn import(&self, path: &Path) -> Result<String> {
        let emitter = OrderedEventEmitter::new(self.event_bus.clone());
        self.import_with(&emitter, path).await
    }

    async fn import_with(&self, emitter: &OrderedEventEmitter, path: &Path) -> Result<String> {
        let status = import_artifact(self.importer.as_ref(), path).await?;
        emitter.emit(Event::ArtifactImported {
            path: path.display().to_string(),
            status: status.clone(),
        });
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_defaults() {
        let request = BuildRequest::new(
            "https://github.com/rianfowler/backstage-dagger-demo.git",
            "main",
            "./dagger-backstage-demo.tar",
        );

        assert_eq!(request.mode, LifecycleMode::Phased);
        assert_eq!(request.image, "dagger-backstage-demo:latest");
    }

    #[test]
    fn test_build_request_overrides() {
        let request = BuildRequest::new("repo", "main", "out.tar")
            .with_mode(LifecycleMode::Creator)
            .with_image("registry.local/app:dev");

        assert_eq!(request.mode, LifecycleMode::Creator);
        assert_eq!(request.image, "registry.local/app:dev");
    }
}
