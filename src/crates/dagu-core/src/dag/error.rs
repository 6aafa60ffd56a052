use thiserror::Error;

/// Errors raised while loading or validating a DAG definition.
///
/// These are all surfaced at load time; none of them are retried, since
/// retrying a malformed file never makes it well-formed.
#[derive(Debug, Error)]
pub enum DagError {
    #[error("failed to read DAG file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse DAG yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("cycle detected: {from} -> {to}")]
    CycleDetected { from: String, to: String },

    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("step {step:?} depends on unknown step {dependency:?}")]
    UnknownDependency { step: String, dependency: String },

    #[error("invalid schedule expression {0:?}: {1}")]
    InvalidSchedule(String, String),

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("stop/restart schedule given without a start schedule")]
    ScheduleWithoutStart,
}

pub type Result<T> = std::result::Result<T, DagError>;
