use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Lifecycle plan must contain at least one phase")]
    EmptyPlan,

    #[error("Duplicate phase name in lifecycle plan: {0}")]
    DuplicatePhase(String),

    #[error("Unknown lifecycle mode: {0}")]
    UnknownMode(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
