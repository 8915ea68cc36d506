//! Execution request construction.
//!
//! [`RequestBuilder`] turns a [`PhaseSpec`] into the [`ExecutionRequest`] the
//! engine runs. It is a pure function of the settings, the snapshot, the run id
//! and the phase, so equal inputs always yield equal requests.

use cnb_core::{CoreError, ExecutionRequest, LifecycleMode, LifecyclePlan, Mount, PhaseSpec, UserMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use vcs::SourceSnapshot;

pub const DEFAULT_BUILDER_IMAGE: &str = "paketobuildpacks/builder-jammy-full";
pub const DEFAULT_APP_DIR: &str = "/workspace";
pub const DEFAULT_LAYERS_DIR: &str = "/layers";
pub const DEFAULT_STACK_ID: &str = "paketo-buildpacks/jammy";
pub const DEFAULT_PLATFORM_API: &str = "0.3";

pub const STACK_ID_VAR: &str = "CNB_STACK_ID";
pub const PLATFORM_API_VAR: &str = "CNB_PLATFORM_API";

/// Pipeline-wide knobs shared by every phase of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub builder_image: String,
    /// Mount point of the source tree and working directory of every phase
    pub app_dir: String,
    /// Mount point of the layer cache
    pub layers_dir: String,
    pub user: UserMode,
    pub env: BTreeMap<String, String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert(STACK_ID_VAR.to_string(), DEFAULT_STACK_ID.to_string());
        env.insert(PLATFORM_API_VAR.to_string(), DEFAULT_PLATFORM_API.to_string());

        Self {
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            app_dir: DEFAULT_APP_DIR.to_string(),
            layers_dir: DEFAULT_LAYERS_DIR.to_string(),
            user: UserMode::Root,
            env,
        }
    }
}

impl PipelineSettings {
    pub fn with_builder_image(mut self, image: impl Into<String>) -> Self {
        self.builder_image = image.into();
        self
    }

    pub fn with_user(mut self, user: UserMode) -> Self {
        self.user = user;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_platform_api(self, version: impl Into<String>) -> Self {
        self.with_env(PLATFORM_API_VAR, version)
    }

    pub fn with_stack_id(self, stack_id: impl Into<String>) -> Self {
        self.with_env(STACK_ID_VAR, stack_id)
    }

    pub fn platform_api(&self) -> Option<&str> {
        self.env.get(PLATFORM_API_VAR).map(String::as_str)
    }

    /// The preset plan for `mode`, pointed at this configuration's directories.
    pub fn plan(&self, mode: LifecycleMode) -> LifecyclePlan {
        mode.plan(&self.app_dir, &self.layers_dir)
    }

    pub fn validate(&self) -> cnb_core::Result<()> {
        if self.builder_image.trim().is_empty() {
            return Err(CoreError::Validation("builder image is empty".to_string()));
        }
        for (label, dir) in [("app dir", &self.app_dir), ("layers dir", &self.layers_dir)] {
            if !dir.starts_with('/') {
                return Err(CoreError::Validation(format!(
                    "{} must be an absolute container path: {}",
                    label, dir
                )));
            }
        }
        if self.app_dir == self.layers_dir {
            return Err(CoreError::Validation(
                "app dir and layers dir must differ".to_string(),
            ));
        }
        for required in [STACK_ID_VAR, PLATFORM_API_VAR] {
            if self.env.get(required).map_or(true, |v| v.is_empty()) {
                return Err(CoreError::Validation(format!("{} is not set", required)));
            }
        }
        Ok(())
    }
}

/// Builds one request per phase for a single run.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    settings: &'a PipelineSettings,
    snapshot: &'a SourceSnapshot,
    run_id: Uuid,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(settings: &'a PipelineSettings, snapshot: &'a SourceSnapshot, run_id: Uuid) -> Self {
        Self {
            settings,
            snapshot,
            run_id,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn build(&self, phase: &PhaseSpec) -> ExecutionRequest {
        ExecutionRequest {
            name: environment_name(self.run_id, &phase.name),
            image: self.settings.builder_image.clone(),
            mounts: vec![
                Mount::new(self.snapshot.path.clone(), self.settings.app_dir.clone()),
                Mount::new(
                    self.snapshot.layers_path.clone(),
                    self.settings.layers_dir.clone(),
                ),
            ],
            workdir: self.settings.app_dir.clone(),
            env: self.settings.env.clone(),
            user: self.settings.user,
            args: phase.args.clone(),
        }
    }
}

/// `cnb-<run>-<phase>`, restricted to characters container engines accept in names.
pub fn environment_name(run_id: Uuid, phase: &str) -> String {
    let phase: String = phase
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("cnb-{}-{}", run_id.simple(), phase)
}
