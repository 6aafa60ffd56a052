use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCron(String, String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
