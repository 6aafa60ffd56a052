//! Built-ins that are registered by name but not implemented: `docker`,
//! `http`, `ssh`, `mail`, `jq`. Resolving one of these from a step's
//! `executor.type` is a configuration error, not a panic, so a run can still
//! report it on the node rather than crashing the agent.

use super::{Executor, ExecutorError, Result, Signal};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct StubExecutor {
    name: &'static str,
}

impl StubExecutor {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Executor for StubExecutor {
    fn set_stdout(&mut self, _path: PathBuf) {}
    fn set_stderr(&mut self, _path: PathBuf) {}

    async fn run(&mut self) -> Result<i32> {
        Err(ExecutorError::NotImplemented(self.name.to_string()))
    }

    async fn kill(&mut self, _signal: Signal) -> Result<()> {
        Ok(())
    }
}
