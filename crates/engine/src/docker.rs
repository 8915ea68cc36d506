use async_trait::async_trait;
use cnb_core::ExecutionRequest;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::traits::{ArtifactExporter, ArtifactImporter, ExecutionEnvironment, FilesystemHandle};

const DOCKER: &str = "docker";

/// Lines of stderr kept for the failure diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// Runs phases as containers through the `docker` client.
///
/// Each phase is `docker create` followed by `docker start --attach`, so the
/// stopped container outlives the command and its id becomes the
/// [`FilesystemHandle`].
#[derive(Debug, Clone)]
pub struct DockerEngine {
    binary: PathBuf,
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerEngine {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(DOCKER),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve the docker client from `PATH`.
    pub fn locate() -> Result<Self> {
        which::which(DOCKER)
            .map(Self::with_binary)
            .map_err(|_| EngineError::CommandNotFound(DOCKER.to_string()))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run_docker(&self, args: &[String]) -> Result<String> {
        debug!("Running docker {:?}", args);

        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::command_failed(
                format!("docker {}", args.first().map(String::as_str).unwrap_or("")),
                stderr.trim(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Id of the local image tagged `image`, if there is one.
    async fn image_id(&self, image: &str) -> Option<String> {
        let output = self
            .run_docker(&[
                "image".to_string(),
                "inspect".to_string(),
                "--format".to_string(),
                "{{.Id}}".to_string(),
                image.to_string(),
            ])
            .await
            .ok()?;
        let id = output.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    fn spawn_error(&self, e: std::io::Error) -> EngineError {
        match e.kind() {
            std::io::ErrorKind::NotFound => {
                EngineError::CommandNotFound(self.binary.display().to_string())
            }
            _ => EngineError::Io(e),
        }
    }

    /// Arguments for `docker create` that reproduce `request` exactly.
    pub fn create_args(request: &ExecutionRequest) -> Result<Vec<String>> {
        let (program, rest) = request
            .args
            .split_first()
            .ok_or_else(|| EngineError::InvalidRequest(format!("{} has no command", request.name)))?;

        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            request.name.clone(),
        ];

        if request.user.is_privileged() {
            args.push("--user".to_string());
            args.push("0:0".to_string());
        }

        for mount in &request.mounts {
            let source = mount
                .source
                .to_str()
                .ok_or_else(|| EngineError::InvalidPath(mount.source.display().to_string()))?;
            args.push("--mount".to_string());
            args.push(format!(
                "type=bind,source={},target={}",
                source, mount.target
            ));
        }

        args.push("--workdir".to_string());
        args.push(request.workdir.clone());

        for pair in request.env_pairs() {
            args.push("--env".to_string());
            args.push(pair);
        }

        args.push("--entrypoint".to_string());
        args.push(program.clone());
        args.push(request.image.clone());
        args.extend(rest.iter().cloned());

        Ok(args)
    }

    /// Start the created container attached, forwarding its output to the log.
    async fn start_attached(&self, request: &ExecutionRequest) -> Result<()> {
        let mut child = self
            .command()
            .args(["start", "--attach", request.name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (_, tail, status) = tokio::join!(
            forward_lines(stdout, &request.name, false),
            forward_lines(stderr, &request.name, true),
            child.wait()
        );
        let status = status?;

        if status.success() {
            return Ok(());
        }

        Err(EngineError::NonZeroExit {
            name: request.name.clone(),
            code: status.code(),
            stderr_tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
        })
    }

    async fn remove(&self, target: &str) -> Result<()> {
        self.run_docker(&["rm".to_string(), "--force".to_string(), target.to_string()])
            .await
            .map(|_| ())
    }
}

/// Log every line of a child stream; return the last lines when `keep_tail`.
async fn forward_lines<R>(stream: Option<R>, name: &str, keep_tail: bool) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::new();
    let Some(stream) = stream else {
        return tail;
    };

    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(environment = %name, "{}", line);
        if keep_tail {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
    tail
}

#[async_trait]
impl ExecutionEnvironment for DockerEngine {
    fn name(&self) -> &'static str {
        DOCKER
    }

    async fn run(&self, request: &ExecutionRequest) -> Result<FilesystemHandle> {
        let args = Self::create_args(request)?;
        let id = self.run_docker(&args).await?;
        let handle = FilesystemHandle::new(id)?;

        debug!(environment = %request.name, handle = %handle, "Container created");

        if let Err(e) = self.start_attached(request).await {
            if let Err(rm) = self.remove(handle.id()).await {
                warn!(environment = %request.name, "Failed to remove container: {}", rm);
            }
            return Err(e);
        }

        Ok(handle)
    }

    async fn discard(&self, handle: &FilesystemHandle) -> Result<()> {
        self.remove(handle.id()).await
    }

    async fn abort(&self, request: &ExecutionRequest) -> Result<()> {
        info!(environment = %request.name, "Aborting environment");
        self.remove(&request.name).await
    }
}

#[async_trait]
impl ArtifactExporter for DockerEngine {
    async fn export(&self, handle: &FilesystemHandle, path: &Path, image: &str) -> Result<()> {
        let output = path
            .to_str()
            .ok_or_else(|| EngineError::InvalidPath(path.display().to_string()))?;

        // Committing moves the tag; remember what it pointed at so it can be restored.
        let previous = self.image_id(image).await;

        self.run_docker(&[
            "commit".to_string(),
            handle.id().to_string(),
            image.to_string(),
        ])
        .await?;

        let saved = self
            .run_docker(&[
                "save".to_string(),
                "--output".to_string(),
                output.to_string(),
                image.to_string(),
            ])
            .await;

        // The archive is the only copy handed on; loading it is the importer's job.
        if let Err(e) = self
            .run_docker(&["image".to_string(), "rm".to_string(), image.to_string()])
            .await
        {
            warn!(image = %image, "Failed to untag committed image: {}", e);
        }
        if let Some(id) = previous {
            if let Err(e) = self
                .run_docker(&["tag".to_string(), id.clone(), image.to_string()])
                .await
            {
                warn!(image = %image, previous = %id, "Failed to restore image tag: {}", e);
            }
        }

        saved.map(|_| ())
    }
}

#[async_trait]
impl ArtifactImporter for DockerEngine {
    async fn import(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(EngineError::ArtifactMissing(path.display().to_string()));
        }
        let input = path
            .to_str()
            .ok_or_else(|| EngineError::InvalidPath(path.display().to_string()))?;

        let status = self
            .run_docker(&["load".to_string(), "--input".to_string(), input.to_string()])
            .await?;

        Ok(status.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnb_core::{Mount, UserMode};
    use std::collections::BTreeMap;

    fn request(user: UserMode) -> ExecutionRequest {
        let mut env = BTreeMap::new();
        env.insert("CNB_STACK_ID".to_string(), "paketo-buildpacks/jammy".to_string());
        env.insert("CNB_PLATFORM_API".to_string(), "0.3".to_string());

        ExecutionRequest {
            name: "cnb-run1-builder".to_string(),
            image: "paketobuildpacks/builder-jammy-full".to_string(),
            mounts: vec![
                Mount::new("/srv/run-1/workspace", "/workspace"),
                Mount::new("/srv/run-1/layers", "/layers"),
            ],
            workdir: "/workspace".to_string(),
            env,
            user,
            args: vec![
                "/cnb/lifecycle/builder".to_string(),
                "-layers".to_string(),
                "/layers".to_string(),
                "-app".to_string(),
                "/workspace".to_string(),
            ],
        }
    }

    #[test]
    fn test_create_args() {
        let args = DockerEngine::create_args(&request(UserMode::Root)).unwrap();
        assert_eq!(
            args,
            vec![
                "create",
                "--name",
                "cnb-run1-builder",
                "--user",
                "0:0",
                "--mount",
                "type=bind,source=/srv/run-1/workspace,target=/workspace",
                "--mount",
                "type=bind,source=/srv/run-1/layers,target=/layers",
                "--workdir",
                "/workspace",
                "--env",
                "CNB_PLATFORM_API=0.3",
                "--env",
                "CNB_STACK_ID=paketo-buildpacks/jammy",
                "--entrypoint",
                "/cnb/lifecycle/builder",
                "paketobuildpacks/builder-jammy-full",
                "-layers",
                "/layers",
                "-app",
                "/workspace",
            ]
        );
    }

    #[test]
    fn test_create_args_image_user() {
        let args = DockerEngine::create_args(&request(UserMode::Image)).unwrap();
        assert!(!args.contains(&"--user".to_string()));
    }

    #[test]
    fn test_create_args_requires_command() {
        let mut req = request(UserMode::Root);
        req.args.clear();
        assert!(DockerEngine::create_args(&req).is_err());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let engine = DockerEngine::with_binary("/nonexistent/docker-client");
        let err = engine.run(&request(UserMode::Root)).await.unwrap_err();
        assert!(matches!(err, EngineError::CommandNotFound(_)));
    }

    #[tokio::test]
    async fn test_import_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let engine = DockerEngine::new();
        let err = engine
            .import(&dir.path().join("missing.tar"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ArtifactMissing(_)));
    }
}
