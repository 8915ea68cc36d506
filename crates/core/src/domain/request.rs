use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A host directory bound into an execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
}

impl Mount {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Identity the phase command runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserMode {
    /// uid 0; lifecycle binaries may need it to write into the layers dir
    #[default]
    Root,
    /// whatever user the base image declares
    Image,
}

impl UserMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Image => "image",
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Root)
    }
}

/// Everything an execution environment factory needs to run one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Run-scoped environment name, used to abort it while in flight
    pub name: String,
    pub image: String,
    pub mounts: Vec<Mount>,
    pub workdir: String,
    pub env: BTreeMap<String, String>,
    pub user: UserMode,
    pub args: Vec<String>,
}

impl ExecutionRequest {
    /// Environment variables as `KEY=VALUE` pairs in key order.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    pub fn mount_for(&self, target: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.target == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExecutionRequest {
        let mut env = BTreeMap::new();
        env.insert("CNB_STACK_ID".to_string(), "paketo-buildpacks/jammy".to_string());
        env.insert("CNB_PLATFORM_API".to_string(), "0.3".to_string());

        ExecutionRequest {
            name: "cnb-test-detector".to_string(),
            image: "paketobuildpacks/builder-jammy-full".to_string(),
            mounts: vec![Mount::new("/tmp/run/workspace", "/workspace")],
            workdir: "/workspace".to_string(),
            env,
            user: UserMode::Root,
            args: vec!["/cnb/lifecycle/detector".to_string()],
        }
    }

    #[test]
    fn test_env_pairs_sorted() {
        assert_eq!(
            request().env_pairs(),
            vec![
                "CNB_PLATFORM_API=0.3".to_string(),
                "CNB_STACK_ID=paketo-buildpacks/jammy".to_string()
            ]
        );
    }

    #[test]
    fn test_mount_lookup() {
        let req = request();
        assert_eq!(
            req.mount_for("/workspace").map(|m| m.source.clone()),
            Some(PathBuf::from("/tmp/run/workspace"))
        );
        assert!(req.mount_for("/layers").is_none());
    }

    #[test]
    fn test_user_mode_serialization() {
        let json = serde_json::to_string(&UserMode::Root).unwrap();
        assert_eq!(json, "\"root\"");
        assert!(UserMode::Root.is_privileged());
        assert!(!UserMode::Image.is_privileged());
    }
}
