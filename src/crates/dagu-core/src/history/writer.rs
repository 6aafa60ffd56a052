use super::error::{HistoryError, Result};
use super::snapshot::Snapshot;
use dagu_tooling::async_utils::retry::RetryPolicy;
use nix::fcntl::{flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

/// The single writer for one run's history file. Holds an advisory lock for
/// the lifetime of the writer as defense-in-depth on top of the control
/// socket's exclusive-ownership guarantee.
pub struct Writer {
    file: File,
    path: PathBuf,
}

impl Writer {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
            .map_err(|_| HistoryError::WriterLocked)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Appends one snapshot as a single line of canonical JSON, retrying
    /// transient I/O failures three times with a 100ms backoff before
    /// surfacing [`HistoryError::StorageUnavailable`].
    pub async fn append(&mut self, snapshot: &Snapshot) -> Result<()> {
        let stable = dagu_tooling::serialization::to_stable_json(snapshot).map_err(|e| {
            HistoryError::StorageUnavailable(format!("failed to serialize snapshot: {e}"))
        })?;
        let mut buf = stable.into_bytes();
        buf.push(b'\n');

        let policy = RetryPolicy::new(3)
            .with_initial_interval(0.1)
            .with_backoff_factor(1.0)
            .with_jitter(false);
        let mut last_err = None;
        for attempt in 0..policy.max_attempts {
            match self.file.write_all(&buf).and_then(|_| self.file.flush()) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if policy.should_retry(attempt + 1) {
                        tokio::time::sleep(policy.calculate_delay(attempt)).await;
                    }
                }
            }
        }
        Err(HistoryError::StorageUnavailable(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = flock(self.file.as_raw_fd(), FlockArg::Unlock);
    }
}
