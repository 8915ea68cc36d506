use anyhow::{Context, Result};
use cnb_core::{LifecycleMode, UserMode};
use orchestrator::request::{
    DEFAULT_APP_DIR, DEFAULT_BUILDER_IMAGE, DEFAULT_LAYERS_DIR, DEFAULT_PLATFORM_API,
    DEFAULT_STACK_ID,
};
use orchestrator::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".cnb-build";
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_REPOSITORY: &str = "https://github.com/rianfowler/backstage-dagger-demo.git";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_ARCHIVE: &str = "./dagger-backstage-demo.tar";
const DEFAULT_CHECKOUT_DIR: &str = ".cnb-build/sources";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub source: SourceConfig,
    pub lifecycle: LifecycleConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub repository: String,
    pub branch: String,
    /// Where run checkouts are created, relative to the working directory
    pub checkout_dir: PathBuf,
    /// Keep the checkout after a successful build
    pub keep: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repository: DEFAULT_REPOSITORY.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            checkout_dir: PathBuf::from(DEFAULT_CHECKOUT_DIR),
            keep: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub mode: LifecycleMode,
    pub builder_image: String,
    pub platform_api: String,
    pub stack_id: String,
    pub app_dir: String,
    pub layers_dir: String,
    pub run_as_root: bool,
    /// Extra variables for every phase
    pub env: BTreeMap<String, String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            mode: LifecycleMode::Phased,
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            platform_api: DEFAULT_PLATFORM_API.to_string(),
            stack_id: DEFAULT_STACK_ID.to_string(),
            app_dir: DEFAULT_APP_DIR.to_string(),
            layers_dir: DEFAULT_LAYERS_DIR.to_string(),
            run_as_root: true,
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub archive: PathBuf,
    /// Tag for the exported image; derived from the archive name when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from(DEFAULT_ARCHIVE),
            image: None,
        }
    }
}

impl BuildConfig {
    /// Read `path`, or `.cnb-build/config.toml` under `cwd` when it exists.
    ///
    /// An explicit path must exist; the implicit one falls back to defaults.
    pub fn load(path: Option<&Path>, cwd: &Path) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (default_path(cwd), false),
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn settings(&self) -> PipelineSettings {
        let lifecycle = &self.lifecycle;
        let user = if lifecycle.run_as_root {
            UserMode::Root
        } else {
            UserMode::Image
        };

        let mut settings = PipelineSettings {
            app_dir: lifecycle.app_dir.clone(),
            layers_dir: lifecycle.layers_dir.clone(),
            ..PipelineSettings::default()
        }
        .with_builder_image(&lifecycle.builder_image)
        .with_platform_api(&lifecycle.platform_api)
        .with_stack_id(&lifecycle.stack_id)
        .with_user(user);

        for (key, value) in &lifecycle.env {
            settings = settings.with_env(key, value);
        }
        settings
    }

    /// Checkout directory resolved against `cwd`; bind mounts need absolute paths.
    pub fn checkout_base(&self, cwd: &Path) -> PathBuf {
        cwd.join(&self.source.checkout_dir)
    }
}

pub fn default_path(cwd: &Path) -> PathBuf {
    cwd.join(CONFIG_DIR).join(CONFIG_FILE)
}
