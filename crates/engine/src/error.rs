use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Environment {name} exited with {}{}", exit_label(.code), tail_suffix(.stderr_tail))]
    NonZeroExit {
        name: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Invalid filesystem handle: {0}")]
    InvalidHandle(String),

    #[error("Artifact not found: {0}")]
    ArtifactMissing(String),

    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn command_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Exit status of the phase command, when it ran at all.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

fn tail_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {}", tail)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
