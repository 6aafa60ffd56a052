use super::error::Result;
use std::path::Path;
use std::process::Stdio;

/// The bridge from "this schedule entry fired" to "an Agent is now running
/// it". Abstracted behind a trait so tests can substitute a recording stub
/// instead of actually forking a process.
pub trait Job: Send + Sync {
    fn start(&self, dag_path: &Path, run_id: &str, params: Option<&str>) -> Result<()>;
}

/// Forks and execs the `dagu` CLI binary as a detached process in its own
/// process group, inheriting the scheduler's environment. Does not wait for
/// it — the spawned process becomes an Agent (C7) and outlives this call.
pub struct SubprocessJob {
    pub binary: std::path::PathBuf,
}

impl SubprocessJob {
    pub fn new(binary: impl Into<std::path::PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Job for SubprocessJob {
    fn start(&self, dag_path: &Path, run_id: &str, params: Option<&str>) -> Result<()> {
        let mut cmd = std::process::Command::new(&self.binary);
        cmd.arg("start").arg(format!("--run-id={run_id}"));
        if let Some(params) = params {
            cmd.arg(format!("--params={params}"));
        }
        cmd.arg(dag_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        unsafe {
            use std::os::unix::process::CommandExt;
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }

        cmd.spawn()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingJob {
        pub started: Mutex<Vec<(std::path::PathBuf, String)>>,
    }

    impl Job for RecordingJob {
        fn start(&self, dag_path: &Path, run_id: &str, _params: Option<&str>) -> Result<()> {
            self.started
                .lock()
                .unwrap()
                .push((dag_path.to_path_buf(), run_id.to_string()));
            Ok(())
        }
    }
}
