use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CoreError, Result};

/// Directory holding the lifecycle binaries inside a CNB builder image.
pub const LIFECYCLE_DIR: &str = "/cnb/lifecycle";

/// One lifecycle step: a name and the command executed for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    pub args: Vec<String>,
}

impl PhaseSpec {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a phase that runs `/cnb/lifecycle/<binary>` with the given flags.
    pub fn lifecycle(binary: &str, flags: &[(&str, &str)]) -> Self {
        let mut args = vec![format!("{}/{}", LIFECYCLE_DIR, binary)];
        for (flag, value) in flags {
            args.push((*flag).to_string());
            args.push((*value).to_string());
        }
        Self {
            name: binary.to_string(),
            args,
        }
    }
}

/// Which preset plan drives a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleMode {
    /// detect, analyze, restore, build, export as separate environments
    #[default]
    Phased,
    /// the single combined `creator` binary
    Creator,
}

impl LifecycleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phased => "phased",
            Self::Creator => "creator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "phased" => Some(Self::Phased),
            "creator" => Some(Self::Creator),
            _ => None,
        }
    }

    pub fn plan(&self, app_dir: &str, layers_dir: &str) -> LifecyclePlan {
        match self {
            Self::Phased => LifecyclePlan::phased(app_dir, layers_dir),
            Self::Creator => LifecyclePlan::creator(app_dir, layers_dir),
        }
    }
}

impl std::str::FromStr for LifecycleMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownMode(s.to_string()))
    }
}

/// An ordered, non-empty sequence of phases.
///
/// The order is the execution order; nothing downstream reorders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecyclePlan {
    phases: Vec<PhaseSpec>,
}

impl LifecyclePlan {
    pub fn new(phases: Vec<PhaseSpec>) -> Result<Self> {
        if phases.is_empty() {
            return Err(CoreError::EmptyPlan);
        }

        let mut seen = HashSet::new();
        for phase in &phases {
            if phase.name.trim().is_empty() {
                return Err(CoreError::Validation("phase name is empty".to_string()));
            }
            if phase.args.is_empty() {
                return Err(CoreError::Validation(format!(
                    "phase {} has no command",
                    phase.name
                )));
            }
            if !seen.insert(phase.name.as_str()) {
                return Err(CoreError::DuplicatePhase(phase.name.clone()));
            }
        }

        Ok(Self { phases })
    }

    /// detector, analyzer, restorer, builder, exporter.
    pub fn phased(app_dir: &str, layers_dir: &str) -> Self {
        let with_layers = [("-layers", layers_dir), ("-app", app_dir)];
        Self {
            phases: vec![
                PhaseSpec::lifecycle("detector", &[("-app", app_dir)]),
                PhaseSpec::lifecycle("analyzer", &with_layers),
                PhaseSpec::lifecycle("restorer", &with_layers),
                PhaseSpec::lifecycle("builder", &with_layers),
                PhaseSpec::lifecycle("exporter", &with_layers),
            ],
        }
    }

    pub fn creator(app_dir: &str, layers_dir: &str) -> Self {
        Self {
            phases: vec![PhaseSpec::lifecycle(
                "creator",
                &[("-layers", layers_dir), ("-app", app_dir)],
            )],
        }
    }

    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Never true for a constructed plan.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PhaseSpec> {
        self.phases.get(index)
    }

    pub fn names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }
}

impl<'de> Deserialize<'de> for LifecyclePlan {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            phases: Vec<PhaseSpec>,
        }

        let raw = Raw::deserialize(deserializer)?;
        LifecyclePlan::new(raw.phases).map_err(serde::de::Error::custom)
    }
}
