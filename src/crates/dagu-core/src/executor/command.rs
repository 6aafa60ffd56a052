//! The `command` executor: forks the configured shell to run a step's
//! command/args (or inline script), in its own process group so cancellation
//! can signal the whole subtree rather than just the immediate child.

use super::{Executor, ExecutorError, Result, Signal};
use async_trait::async_trait;
use nix::sys::signal::{self, Signal as NixSignal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::os::unix::process::CommandExt as _;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Child;

pub struct CommandExecutor {
    shell: String,
    command_line: String,
    dir: Option<PathBuf>,
    env: HashMap<String, String>,
    stdout_path: Option<PathBuf>,
    stderr_path: Option<PathBuf>,
    child: Option<Child>,
}

impl CommandExecutor {
    pub fn new(shell: String, command_line: String, dir: Option<PathBuf>, env: HashMap<String, String>) -> Self {
        Self {
            shell,
            command_line,
            dir,
            env,
            stdout_path: None,
            stderr_path: None,
            child: None,
        }
    }

    fn stdio_for(path: &Option<PathBuf>) -> std::io::Result<Stdio> {
        match path {
            Some(p) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)?;
                Ok(Stdio::from(file))
            }
            None => Ok(Stdio::null()),
        }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    fn set_stdout(&mut self, path: PathBuf) {
        self.stdout_path = Some(path);
    }

    fn set_stderr(&mut self, path: PathBuf) {
        self.stderr_path = Some(path);
    }

    async fn run(&mut self) -> Result<i32> {
        let mut cmd = tokio::process::Command::new(&self.shell);
        cmd.arg("-c").arg(&self.command_line);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.env);
        cmd.stdout(Self::stdio_for(&self.stdout_path)?);
        cmd.stderr(Self::stdio_for(&self.stderr_path)?);
        cmd.stdin(Stdio::null());
        // Detach into a new session/process group so a SIGTERM/SIGKILL sent
        // to -pid reaches every descendant the shell forked, not just it.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|e| ExecutorError::Spawn(e.to_string()))?;
        // Store the child before awaiting so a concurrent `kill` call (the
        // cancellation path runs on a separate task) can see and signal it.
        self.child = Some(child);
        let status = self
            .child
            .as_mut()
            .expect("just inserted")
            .wait()
            .await
            .map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        Ok(exit_code_of(&status))
    }

    async fn kill(&mut self, signal: Signal) -> Result<()> {
        let Some(child) = self.child.as_ref() else {
            return Ok(());
        };
        let Some(pid) = child.id() else {
            // Already reaped.
            return Ok(());
        };
        let nix_sig = match signal {
            Signal::Term => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
            Signal::Other(n) => {
                NixSignal::try_from(n).map_err(|e| ExecutorError::Signal(e.to_string()))?
            }
        };
        // Negative pid targets the whole process group created by setsid above.
        match signal::kill(Pid::from_raw(-(pid as i32)), nix_sig) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(ExecutorError::Signal(e.to_string())),
        }
    }
}

fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(code) = status.code() {
        code
    } else if let Some(signal) = status.signal() {
        128 + signal
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_successful_command() {
        let mut exec = CommandExecutor::new(
            "/bin/sh".to_string(),
            "exit 0".to_string(),
            None,
            HashMap::new(),
        );
        assert_eq!(exec.run().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reports_nonzero_exit() {
        let mut exec = CommandExecutor::new(
            "/bin/sh".to_string(),
            "exit 7".to_string(),
            None,
            HashMap::new(),
        );
        assert_eq!(exec.run().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn kill_before_spawn_is_a_no_op() {
        let mut exec = CommandExecutor::new(
            "/bin/sh".to_string(),
            "exit 0".to_string(),
            None,
            HashMap::new(),
        );
        assert!(exec.kill(Signal::Term).await.is_ok());
    }
}
