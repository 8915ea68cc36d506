#![cfg(unix)]

use cnb_core::{ExecutionRequest, Mount, UserMode};
use engine::{
    ArtifactExporter, ArtifactImporter, DockerEngine, EngineError, ExecutionEnvironment,
    FilesystemHandle,
};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

// Executing a freshly written script races with forks from parallel tests.
static TEST_MUTEX: Mutex<()> = Mutex::new(());

const FAKE_DOCKER: &str = r#"#!/bin/sh
dir=$(dirname "$0")
echo "$*" >> "$dir/calls.log"
case "$1" in
  create)
    echo "c0ffee1234"
    ;;
  start)
    echo "===> BUILDING"
    echo "phase output on stderr" >&2
    exit "$(cat "$dir/start_exit")"
    ;;
  save)
    echo "archive" > "$3"
    ;;
  image)
    if [ "$2" = inspect ]; then
      if [ -f "$dir/existing_image" ]; then
        cat "$dir/existing_image"
      else
        echo "Error: No such image: $5" >&2
        exit 1
      fi
    fi
    ;;
  load)
    if [ -f "$dir/load_fails" ]; then
      echo "Cannot connect to the Docker daemon" >&2
      exit 1
    fi
    echo "Loaded image: backstage-dagger-demo:latest"
    ;;
esac
exit 0
"#;

struct FakeDocker {
    dir: TempDir,
    binary: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl FakeDocker {
    fn new(start_exit: i32) -> Self {
        let lock = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("docker");
        std::fs::write(&binary, FAKE_DOCKER).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("start_exit"), start_exit.to_string()).unwrap();
        Self {
            dir,
            binary,
            _lock: lock,
        }
    }

    fn engine(&self) -> DockerEngine {
        DockerEngine::with_binary(&self.binary)
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn request() -> ExecutionRequest {
    let mut env = BTreeMap::new();
    env.insert("CNB_PLATFORM_API".to_string(), "0.3".to_string());

    ExecutionRequest {
        name: "cnb-test-detector".to_string(),
        image: "paketobuildpacks/builder-jammy-full".to_string(),
        mounts: vec![Mount::new("/tmp/ws", "/workspace")],
        workdir: "/workspace".to_string(),
        env,
        user: UserMode::Root,
        args: vec![
            "/cnb/lifecycle/detector".to_string(),
            "-app".to_string(),
            "/workspace".to_string(),
        ],
    }
}

#[tokio::test]
async fn test_run_success_returns_container_handle() {
    let docker = FakeDocker::new(0);

    let handle = docker.engine().run(&request()).await.unwrap();

    assert_eq!(handle.id(), "c0ffee1234");
    let calls = docker.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("create --name cnb-test-detector"));
    assert_eq!(calls[1], "start --attach cnb-test-detector");
}

#[tokio::test]
async fn test_run_failure_reports_status_and_removes_container() {
    let docker = FakeDocker::new(3);

    let err = docker.engine().run(&request()).await.unwrap_err();

    match err {
        EngineError::NonZeroExit {
            name,
            code,
            stderr_tail,
        } => {
            assert_eq!(name, "cnb-test-detector");
            assert_eq!(code, Some(3));
            assert_eq!(stderr_tail, "phase output on stderr");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(docker.calls().last().unwrap(), "rm --force c0ffee1234");
}

#[tokio::test]
async fn test_abort_removes_by_name() {
    let docker = FakeDocker::new(0);

    docker.engine().abort(&request()).await.unwrap();

    assert_eq!(docker.calls(), vec!["rm --force cnb-test-detector"]);
}

#[tokio::test]
async fn test_export_commits_saves_and_untags() {
    let docker = FakeDocker::new(0);
    let archive = docker.path().join("image.tar");
    let handle = FilesystemHandle::new("c0ffee1234").unwrap();

    docker
        .engine()
        .export(&handle, &archive, "app:latest")
        .await
        .unwrap();

    assert!(archive.exists());
    assert_eq!(
        docker.calls(),
        vec![
            "image inspect --format {{.Id}} app:latest".to_string(),
            "commit c0ffee1234 app:latest".to_string(),
            format!("save --output {} app:latest", archive.display()),
            "image rm app:latest".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_export_restores_existing_tag() {
    let docker = FakeDocker::new(0);
    let archive = docker.path().join("image.tar");
    let handle = FilesystemHandle::new("c0ffee1234").unwrap();
    std::fs::write(docker.path().join("existing_image"), "sha256:0ld1mage\n").unwrap();

    docker
        .engine()
        .export(&handle, &archive, "app:latest")
        .await
        .unwrap();

    let calls = docker.calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls[3], "image rm app:latest");
    assert_eq!(calls[4], "tag sha256:0ld1mage app:latest");
}

#[tokio::test]
async fn test_import_returns_runtime_status() {
    let docker = FakeDocker::new(0);
    let archive = docker.path().join("image.tar");
    std::fs::write(&archive, "archive").unwrap();

    let status = docker.engine().import(&archive).await.unwrap();
    assert_eq!(status, "Loaded image: backstage-dagger-demo:latest");

    // A second load of the same archive is just as valid.
    let again = docker.engine().import(&archive).await.unwrap();
    assert_eq!(again, status);
}

#[tokio::test]
async fn test_import_failure_keeps_archive() {
    let docker = FakeDocker::new(0);
    let archive = docker.path().join("image.tar");
    std::fs::write(&archive, "archive").unwrap();
    std::fs::write(docker.path().join("load_fails"), "").unwrap();

    let err = docker.engine().import(&archive).await.unwrap_err();

    assert!(matches!(err, EngineError::CommandFailed { .. }));
    assert!(archive.exists());
}
