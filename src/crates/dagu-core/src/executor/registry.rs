//! An explicit map from executor name to constructor, built once at startup
//! and threaded through the agent/graph rather than relying on the
//! process-init side effects the teacher's executors used to register
//! themselves with.

use super::{CommandExecutor, Executor, ExecutorError, StubExecutor};
use crate::dag::Step;
use std::collections::HashMap;

pub type ExecutorFactory = fn(&Step) -> Box<dyn Executor>;

pub struct Registry {
    factories: HashMap<&'static str, ExecutorFactory>,
}

impl Registry {
    pub fn new() -> Self {
        let mut factories: HashMap<&'static str, ExecutorFactory> = HashMap::new();
        factories.insert("command", build_command_executor);
        factories.insert("docker", |_| Box::new(StubExecutor::new("docker")));
        factories.insert("http", |_| Box::new(StubExecutor::new("http")));
        factories.insert("ssh", |_| Box::new(StubExecutor::new("ssh")));
        factories.insert("mail", |_| Box::new(StubExecutor::new("mail")));
        factories.insert("jq", |_| Box::new(StubExecutor::new("jq")));
        Self { factories }
    }

    pub fn register(&mut self, name: &'static str, factory: ExecutorFactory) {
        self.factories.insert(name, factory);
    }

    pub fn build(&self, step: &Step) -> Result<Box<dyn Executor>, ExecutorError> {
        let kind = step.executor.kind.as_str();
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ExecutorError::Unknown(kind.to_string()))?;
        Ok(factory(step))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_command_executor(step: &Step) -> Box<dyn Executor> {
    let shell = step
        .shell
        .clone()
        .or_else(|| std::env::var("SHELL").ok())
        .unwrap_or_else(|| "/bin/sh".to_string());
    let command_line = match &step.script {
        Some(script) => script.clone(),
        None => {
            let mut parts = Vec::new();
            if let Some(cmd) = &step.command {
                parts.push(cmd.clone());
            }
            parts.extend(step.args.iter().cloned());
            parts.join(" ")
        }
    };
    let dir = step.dir.as_ref().map(std::path::PathBuf::from);
    Box::new(CommandExecutor::new(shell, command_line, dir, step.env.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ExecutorConfig;

    fn step(kind: &str) -> Step {
        Step {
            name: "s".to_string(),
            command: Some("echo".to_string()),
            args: vec!["hi".to_string()],
            script: None,
            dir: None,
            shell: None,
            env: Default::default(),
            depends: vec![],
            preconditions: vec![],
            retry_policy: None,
            repeat_policy: None,
            continue_on: Default::default(),
            signal_on_stop: None,
            output: None,
            run: None,
            params: None,
            executor: ExecutorConfig {
                kind: kind.to_string(),
                config: serde_json::Value::Null,
            },
            timeout: None,
        }
    }

    #[test]
    fn resolves_command_executor() {
        let registry = Registry::new();
        assert!(registry.build(&step("command")).is_ok());
    }

    #[test]
    fn unregistered_executor_is_an_error() {
        let registry = Registry::new();
        assert!(matches!(
            registry.build(&step("kubernetes")),
            Err(ExecutorError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn stub_executors_report_not_implemented() {
        let registry = Registry::new();
        let mut exec = registry.build(&step("docker")).unwrap();
        assert!(matches!(
            exec.run().await,
            Err(ExecutorError::NotImplemented(_))
        ));
    }
}
