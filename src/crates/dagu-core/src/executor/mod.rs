//! The executor interface: a pluggable way to run a single step. Built-in
//! executors are registered by name in a [`Registry`] and resolved per node
//! from the step's `executor.type`, replacing the teacher's process-init
//! side-effect registration with an explicit map constructed at startup.

mod command;
mod registry;
mod stub;

pub use command::CommandExecutor;
pub use registry::{ExecutorFactory, Registry};
pub use stub::StubExecutor;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor {0:?} is not registered")]
    Unknown(String),

    #[error("executor {0:?} is not implemented")]
    NotImplemented(String),

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to signal process: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// One step's executor instance. Implementations are constructed fresh per
/// node execution attempt (so `run` may be called again by the retry loop).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Directs stdout to the given file, truncating/creating it.
    fn set_stdout(&mut self, path: PathBuf);
    /// Directs stderr to the given file, truncating/creating it.
    fn set_stderr(&mut self, path: PathBuf);

    /// Runs the step to completion, returning its exit code. A spawn
    /// failure (the process never started) is reported as exit code -1.
    async fn run(&mut self) -> Result<i32>;

    /// Sends a termination signal to the running process. Idempotent: safe
    /// to call more than once, and a no-op if the process already exited or
    /// never started.
    async fn kill(&mut self, signal: Signal) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
    Other(i32),
}

impl Signal {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "SIGKILL" | "KILL" => Signal::Kill,
            "SIGTERM" | "TERM" => Signal::Term,
            other => other
                .trim_start_matches("SIG")
                .parse::<i32>()
                .map(Signal::Other)
                .unwrap_or(Signal::Term),
        }
    }
}
