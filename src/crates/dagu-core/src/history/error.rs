use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no status recorded for today")]
    NoStatusToday,

    #[error("no status data for this DAG")]
    NoStatusData,

    #[error("run {0:?} not found")]
    RunNotFound(String),

    #[error("another writer already holds the lock for this run")]
    WriterLocked,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type Result<T> = std::result::Result<T, HistoryError>;
