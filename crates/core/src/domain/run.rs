use serde::{Deserialize, Serialize};

/// Progress of one pipeline run.
///
/// `Succeeded`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Pending,
    Running {
        index: usize,
        phase: String,
    },
    Succeeded,
    Failed {
        index: usize,
        phase: String,
    },
    Cancelled {
        index: usize,
    },
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running { .. } => "running",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running { index, phase } => write!(f, "running({}:{})", index, phase),
            Self::Failed { index, phase } => write!(f, "failed({}:{})", index, phase),
            Self::Cancelled { index } => write!(f, "cancelled({})", index),
            other => f.write_str(other.as_str()),
        }
    }
}
