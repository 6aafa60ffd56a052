use super::error::{HistoryError, Result};
use super::snapshot::{RunState, Snapshot};
use super::writer::Writer;
use crate::hashpath::hash_path;
use chrono::{Duration as ChronoDuration, Utc};
use dagu_support::client::{ControlClient, ControlClientConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Filesystem-backed history of every run, laid out as
/// `<data_dir>/<hash(dag path)>/status.<yyyymmdd>.<run-id>.dat`.
pub struct Store {
    data_dir: PathBuf,
    socket_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            socket_dir: socket_dir.into(),
        }
    }

    fn dag_dir(&self, dag_path: &Path) -> PathBuf {
        self.data_dir.join(hash_path(dag_path))
    }

    fn file_path(&self, dag_path: &Path, run_id: &str, day: &str) -> PathBuf {
        self.dag_dir(dag_path)
            .join(format!("status.{day}.{run_id}.dat"))
    }

    pub fn open(&self, dag_path: &Path, run_id: &str) -> Result<Writer> {
        let day = Utc::now().format("%Y%m%d").to_string();
        Writer::open(self.file_path(dag_path, run_id, &day))
    }

    /// Files for this DAG, most-recently-modified first.
    fn files_newest_first(&self, dag_path: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.dag_dir(dag_path);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "dat").unwrap_or(false))
            .collect();
        entries.sort();
        entries.reverse();
        Ok(entries)
    }

    fn last_line(path: &Path) -> Result<Option<String>> {
        let content = std::fs::read_to_string(path)?;
        Ok(content.lines().last().map(|s| s.to_string()))
    }

    pub async fn latest_today(&self, dag_path: &Path) -> Result<Snapshot> {
        let today = Utc::now().format("%Y%m%d").to_string();
        let files = self.files_newest_first(dag_path)?;
        let todays_file = files
            .into_iter()
            .find(|f| file_name(f).contains(&format!("status.{today}.")));
        let Some(path) = todays_file else {
            return Err(HistoryError::NoStatusToday);
        };
        let line = Self::last_line(&path)?.ok_or(HistoryError::NoStatusToday)?;
        let snapshot: Snapshot = serde_json::from_str(&line)?;
        Ok(self.apply_liveness(dag_path, snapshot).await)
    }

    pub async fn find_by_run_id(&self, dag_path: &Path, run_id: &str) -> Result<Snapshot> {
        let files = self.files_newest_first(dag_path)?;
        if files.is_empty() {
            return Err(HistoryError::NoStatusData);
        }
        for path in files {
            if !file_name(&path).contains(&format!(".{run_id}.")) {
                continue;
            }
            if let Some(line) = Self::last_line(&path)? {
                let snapshot: Snapshot = serde_json::from_str(&line)?;
                return Ok(self.apply_liveness(dag_path, snapshot).await);
            }
        }
        Err(HistoryError::RunNotFound(run_id.to_string()))
    }

    /// Deletes history files older than `retention_days`.
    pub fn compact(&self, dag_path: &Path, retention_days: u32) -> Result<()> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days as i64);
        for path in self.files_newest_first(dag_path)? {
            let name = file_name(&path);
            if let Some(day) = extract_day(&name) {
                if day < cutoff.format("%Y%m%d").to_string() {
                    std::fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Moves every recorded run from `old_path`'s hash directory to
    /// `new_path`'s, so a renamed DAG file keeps its history.
    pub fn rename(&self, old_path: &Path, new_path: &Path) -> Result<()> {
        let old_dir = self.dag_dir(old_path);
        let new_dir = self.dag_dir(new_path);
        if old_dir.exists() {
            if let Some(parent) = new_dir.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(old_dir, new_dir)?;
        }
        Ok(())
    }

    /// A reader observing `Running` whose agent is unreachable reports it
    /// as `Failed` in the value it returns; the on-disk record is left
    /// untouched.
    async fn apply_liveness(&self, dag_path: &Path, mut snapshot: Snapshot) -> Snapshot {
        if snapshot.status != RunState::Running {
            return snapshot;
        }
        let socket_path = crate::socket::path_for(&self.socket_dir, dag_path);
        let client = ControlClient::new(ControlClientConfig::new().with_timeout(Duration::from_millis(500)));
        match client.get(&socket_path, "/status").await {
            Ok(resp) if resp.status == 200 => snapshot,
            _ => {
                snapshot.status = RunState::Failed;
                snapshot
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extract_day(file_name: &str) -> Option<String> {
    // status.<yyyymmdd>.<run-id>.dat
    file_name.split('.').nth(1).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use std::collections::HashMap;

    fn snapshot(status: RunState) -> Snapshot {
        Snapshot {
            name: "example".to_string(),
            dag_run_id: "run-1".to_string(),
            root: None,
            parent: None,
            status,
            pid: None,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            finished_at: None,
            log: None,
            params: None,
            nodes: HashMap::from([("s1".to_string(), Node::new("s1"))]),
            handler_nodes: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn writes_and_reads_back_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data"), dir.path().join("sock"));
        let dag_path = Path::new("/dags/example.yaml");

        let mut writer = store.open(dag_path, "run-1").unwrap();
        writer.append(&snapshot(RunState::Running)).await.unwrap();
        writer.append(&snapshot(RunState::Success)).await.unwrap();
        drop(writer);

        let latest = store.latest_today(dag_path).await.unwrap();
        assert_eq!(latest.status, RunState::Success);
    }

    #[tokio::test]
    async fn find_by_run_id_scans_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data"), dir.path().join("sock"));
        let dag_path = Path::new("/dags/example.yaml");

        let mut writer = store.open(dag_path, "run-1").unwrap();
        writer.append(&snapshot(RunState::Success)).await.unwrap();
        drop(writer);

        let found = store.find_by_run_id(dag_path, "run-1").await.unwrap();
        assert_eq!(found.dag_run_id, "run-1");
        assert!(store
            .find_by_run_id(dag_path, "ghost")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn no_status_today_is_a_sentinel_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data"), dir.path().join("sock"));
        assert!(matches!(
            store.latest_today(Path::new("/dags/none.yaml")).await,
            Err(HistoryError::NoStatusToday)
        ));
    }

    #[tokio::test]
    async fn running_status_with_dead_agent_reads_back_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data"), dir.path().join("sock"));
        let dag_path = Path::new("/dags/example.yaml");
        let mut writer = store.open(dag_path, "run-1").unwrap();
        writer.append(&snapshot(RunState::Running)).await.unwrap();
        drop(writer);

        // No agent is listening on the control socket for this run, so the
        // liveness probe fails and the reported status is corrected.
        let latest = store.latest_today(dag_path).await.unwrap();
        assert_eq!(latest.status, RunState::Failed);
    }
}
