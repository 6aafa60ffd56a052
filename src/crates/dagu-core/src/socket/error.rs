use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a run is already active for this DAG (socket {0:?} is live)")]
    RunAlreadyActive(std::path::PathBuf),
}

pub type Result<T> = std::result::Result<T, SocketError>;
