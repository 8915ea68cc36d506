use engine::EngineError;
use std::path::PathBuf;
use thiserror::Error;
use vcs::VcsError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Source fetch failed: {0}")]
    SourceFetch(#[from] VcsError),

    #[error("Build failed during {phase} phase: {source}")]
    PhaseExecution {
        phase: String,
        index: usize,
        source: EngineError,
    },

    #[error("Failed to export image: {0}")]
    Export(#[source] EngineError),

    #[error("Failed to load image into local runtime (archive kept at {}): {source}", .path.display())]
    Import { path: PathBuf, source: EngineError },

    #[error("Build cancelled{}", .phase.as_deref().map(|p| format!(" during {}", p)).unwrap_or_default())]
    Cancelled { phase: Option<String> },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid pipeline configuration: {0}")]
    Plan(#[from] cnb_core::CoreError),
}

/// Coarse classification of a failed run, one per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    SourceFetch,
    PhaseExecution,
    Export,
    Import,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::SourceFetch => "source_fetch",
            Self::PhaseExecution => "phase_execution",
            Self::Export => "export",
            Self::Import => "import",
            Self::Cancelled => "cancelled",
        }
    }

    /// Process exit status reported for this kind of failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config => 1,
            Self::SourceFetch => 2,
            Self::PhaseExecution => 3,
            Self::Export => 4,
            Self::Import => 5,
            Self::Cancelled => 130,
        }
    }
}

impl OrchestratorError {
    pub fn phase_failed(phase: impl Into<String>, index: usize, source: EngineError) -> Self {
        Self::PhaseExecution {
            phase: phase.into(),
            index,
            source,
        }
    }

    pub fn cancelled(phase: Option<&str>) -> Self {
        Self::Cancelled {
            phase: phase.map(str::to_string),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceFetch(_) => ErrorKind::SourceFetch,
            Self::PhaseExecution { .. } => ErrorKind::PhaseExecution,
            Self::Export(_) => ErrorKind::Export,
            Self::Import { .. } => ErrorKind::Import,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidTransition { .. } | Self::Plan(_) => ErrorKind::Config,
        }
    }

    /// Name of the failing phase, for phase failures and in-phase cancellation.
    pub fn phase(&self) -> Option<&str> {
        match self {
            Self::PhaseExecution { phase, .. } => Some(phase),
            Self::Cancelled { phase } => phase.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
