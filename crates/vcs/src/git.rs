use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, VcsError};
use crate::traits::{validate_argument, SourceProvider, SourceSnapshot};

const WORKSPACE_DIR: &str = "workspace";
const LAYERS_DIR: &str = "layers";

/// Clones a single branch of a remote repository per run.
pub struct GitSource {
    checkout_base: PathBuf,
    depth: Option<u32>,
}

impl GitSource {
    pub fn new(checkout_base: PathBuf) -> Self {
        Self {
            checkout_base,
            depth: Some(1),
        }
    }

    /// Clone full history instead of a shallow checkout.
    pub fn with_full_history(mut self) -> Self {
        self.depth = None;
        self
    }

    pub fn checkout_base(&self) -> &Path {
        &self.checkout_base
    }

    async fn run_git(&self, args: &[&str], cwd: &Path) -> Result<String> {
        debug!("Running git {:?} in {:?}", args, cwd);

        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => VcsError::CommandNotFound("git".to_string()),
                _ => VcsError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::CommandFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_dir(&self, id: &str) -> PathBuf {
        self.checkout_base.join(format!("run-{}", id))
    }

    fn clone_args(&self, repository: &str, reference: &str, dest: &str) -> Vec<String> {
        let mut args = vec!["clone".to_string()];
        if let Some(depth) = self.depth {
            args.push("--depth".to_string());
            args.push(depth.to_string());
        }
        args.extend(
            [
                "--single-branch",
                "--branch",
                reference,
                "--",
                repository,
                dest,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

#[async_trait]
impl SourceProvider for GitSource {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn is_available(&self) -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn fetch(&self, repository: &str, reference: &str) -> Result<SourceSnapshot> {
        validate_argument("repository", repository)?;
        validate_argument("reference", reference)?;

        let id = Uuid::new_v4().simple().to_string();
        let run_dir = self.run_dir(&id);
        if run_dir.exists() {
            return Err(VcsError::CheckoutExists(run_dir.display().to_string()));
        }

        let workspace = run_dir.join(WORKSPACE_DIR);
        let layers = run_dir.join(LAYERS_DIR);
        tokio::fs::create_dir_all(&layers).await?;

        let dest = workspace
            .to_str()
            .ok_or_else(|| VcsError::InvalidPath(workspace.display().to_string()))?;

        info!(
            repository = %repository,
            reference = %reference,
            path = %workspace.display(),
            "Fetching source"
        );

        let args = self.clone_args(repository, reference, dest);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        if let Err(e) = self.run_git(&args, &run_dir).await {
            warn!("Clone failed: {}, removing {:?}", e, run_dir);
            if let Err(rm) = tokio::fs::remove_dir_all(&run_dir).await {
                warn!("Failed to remove {:?}: {}", run_dir, rm);
            }
            return Err(e);
        }

        let mut snapshot = SourceSnapshot::new(id, repository, reference, workspace, layers);
        match self.run_git(&["rev-parse", "HEAD"], &snapshot.path).await {
            Ok(commit) => snapshot = snapshot.with_commit(commit.trim()),
            Err(e) => warn!("Could not resolve fetched revision: {}", e),
        }

        info!(
            commit = snapshot.short_commit().unwrap_or("unknown"),
            "Source fetched"
        );
        Ok(snapshot)
    }

    async fn cleanup(&self, snapshot: &SourceSnapshot) -> Result<()> {
        let Some(run_dir) = snapshot.run_dir() else {
            return Err(VcsError::InvalidPath(snapshot.path.display().to_string()));
        };

        if !run_dir.starts_with(&self.checkout_base) {
            return Err(VcsError::InvalidPath(format!(
                "{} is outside {}",
                run_dir.display(),
                self.checkout_base.display()
            )));
        }

        if run_dir.exists() {
            tokio::fs::remove_dir_all(run_dir).await?;
        }

        debug!("Removed checkout {:?}", run_dir);
        Ok(())
    }
}
