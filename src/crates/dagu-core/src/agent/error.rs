use crate::dag::DagError;
use crate::graph::GraphError;
use crate::history::HistoryError;
use crate::socket::SocketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("a run is already active for {0:?}")]
    RunAlreadyActive(std::path::PathBuf),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
