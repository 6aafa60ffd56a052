//! The Scheduler Daemon (C8): a singleton process that wakes up once a
//! minute, finds DAGs whose schedule fires at this tick, and starts, stops,
//! or restarts them. It never runs a DAG itself — that's the Agent's job —
//! it only decides *when* and dispatches to a [`Job`].

mod clock;
mod entry;
mod error;
mod job;

pub use clock::{truncate_to_minute, Clock, FrozenClock, SystemClock};
pub use entry::{entries_for_dag, Entry, EntryKind};
pub use error::{Result, SchedulerError};
pub use job::{Job, SubprocessJob};

use crate::dag::{load, LoadOptions};
use crate::history::{RunState, Store};
use crate::queue::QueueStore;
use crate::socket::path_for;
use crate::suspend::SuspendStore;
use chrono::Duration;
use dagu_support::client::ControlClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// The shape `dagu enqueue` writes into the Queue Store: mirrors the CLI's
/// hand-built JSON payload.
#[derive(Debug, serde::Deserialize)]
struct QueuedRequest {
    #[serde(rename = "dagRunId")]
    dag_run_id: String,
    #[serde(default)]
    params: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SchedulerDirs {
    pub dags_dir: PathBuf,
    pub data_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub suspend_dir: PathBuf,
    pub queue_dir: PathBuf,
}

#[derive(Clone)]
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    job: Arc<dyn Job>,
    dirs: SchedulerDirs,
    store: Arc<Store>,
    suspend: Arc<SuspendStore>,
    queue: Arc<QueueStore>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, job: Arc<dyn Job>, dirs: SchedulerDirs) -> Self {
        let store = Arc::new(Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone()));
        let suspend = Arc::new(SuspendStore::new(dirs.suspend_dir.clone()));
        let queue = Arc::new(QueueStore::new(dirs.queue_dir.clone()));
        Self {
            clock,
            job,
            dirs,
            store,
            suspend,
            queue,
        }
    }

    /// Runs the tick loop forever: fire due entries, sleep until the next
    /// minute boundary, repeat. Never returns under normal operation.
    pub async fn run_forever(&self) {
        loop {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "scheduler tick failed");
            }

            let now = self.clock.now();
            let next_tick = truncate_to_minute(now) + Duration::minutes(1);
            let sleep_for = (next_tick - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Runs exactly one tick: scan, filter, sort, dispatch. Each dispatched
    /// entry runs in its own task, so a panic firing one DAG can't take
    /// down the tick or any other entry.
    pub async fn tick(&self) -> Result<()> {
        let tick = truncate_to_minute(self.clock.now());
        let mut entries = Vec::new();
        let dag_files = discover_dag_files(&self.dirs.dags_dir)?;

        for path in &dag_files {
            let dag = match load(path, &LoadOptions { metadata_only: true }) {
                Ok(dag) => dag,
                Err(e) => {
                    tracing::warn!(file = ?path, error = %e, "failed to parse DAG, skipping");
                    continue;
                }
            };
            if dag.schedule.is_empty() {
                continue;
            }
            match entries_for_dag(&dag, path, tick) {
                Ok(es) => entries.extend(es),
                Err(e) => tracing::warn!(file = ?path, error = %e, "invalid schedule, skipping"),
            }
        }

        entries.retain(|e| !self.suspend.is_suspended(&e.dag_path));
        entries.sort_by_key(|e| e.next_fire);

        for entry in entries {
            if entry.next_fire > tick {
                continue;
            }
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.fire(&entry).await {
                    tracing::error!(dag = %entry.dag_name, kind = ?entry.kind, error = %e, "job failed");
                }
            });
        }

        for path in &dag_files {
            self.drain_queue(path).await;
        }

        Ok(())
    }

    /// Drains `dag_path`'s pending queue while the DAG's `MaxActiveRuns`
    /// allows another run — one request per tick, since starting a run is
    /// what makes the next `latest_today` lookup see it as active.
    async fn drain_queue(&self, dag_path: &Path) {
        if self.queue.is_empty(dag_path) {
            return;
        }
        let dag = match load(dag_path, &LoadOptions { metadata_only: true }) {
            Ok(dag) => dag,
            Err(_) => return,
        };
        let active = match self.store.latest_today(dag_path).await {
            Ok(snapshot) => (snapshot.status == RunState::Running) as u32,
            Err(_) => 0,
        };
        if active >= dag.max_active_runs {
            return;
        }
        let Ok(Some(payload)) = self.queue.dequeue(dag_path) else {
            return;
        };
        let request: QueuedRequest = match serde_json::from_str(&payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(file = ?dag_path, error = %e, "malformed queued run request, dropping");
                return;
            }
        };
        if let Err(e) = self
            .job
            .start(dag_path, &request.dag_run_id, request.params.as_deref())
        {
            tracing::error!(file = ?dag_path, error = %e, "failed to start queued run");
        }
    }

    async fn fire(&self, entry: &Entry) -> Result<()> {
        match entry.kind {
            EntryKind::Start => {
                if entry.skip_if_successful && self.already_succeeded_since(entry).await {
                    return Ok(());
                }
                self.start(entry)?;
            }
            EntryKind::Stop => {
                self.stop(entry).await;
            }
            EntryKind::Restart => {
                self.stop(entry).await;
                tokio::time::sleep(entry.restart_wait.to_std().unwrap_or(std::time::Duration::ZERO)).await;
                self.start(entry)?;
            }
        }
        Ok(())
    }

    async fn already_succeeded_since(&self, entry: &Entry) -> bool {
        match self.store.latest_today(&entry.dag_path).await {
            Ok(snapshot) => {
                snapshot.status == RunState::Success
                    && snapshot
                        .started_at
                        .map(|started| started >= entry.next_fire)
                        .unwrap_or(false)
            }
            Err(_) => false,
        }
    }

    fn start(&self, entry: &Entry) -> Result<()> {
        let run_id = Uuid::new_v4().to_string();
        self.job.start(&entry.dag_path, &run_id, None)?;
        Ok(())
    }

    async fn stop(&self, entry: &Entry) {
        let Ok(latest) = self.store.latest_today(&entry.dag_path).await else {
            return;
        };
        if latest.status != RunState::Running {
            return;
        }
        let socket_path = path_for(&self.dirs.socket_dir, &entry.dag_path);
        let client = ControlClient::default();
        if let Err(e) = client.post(&socket_path, "/stop", "").await {
            tracing::warn!(dag = %entry.dag_name, error = %e, "failed to stop run via control socket");
        }
    }
}

/// DAG files are any `.yaml`/`.yml` file directly under `dir` (Dagu does not
/// recurse into subdirectories when discovering scheduled DAGs).
fn discover_dag_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::test_support::RecordingJob;

    fn write_dag(dir: &Path, name: &str, yaml: &str) -> PathBuf {
        let path = dir.join(format!("{name}.yaml"));
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[tokio::test]
    async fn tick_starts_a_dag_whose_schedule_is_due() {
        let root = tempfile::tempdir().unwrap();
        let dags_dir = root.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        write_dag(
            &dags_dir,
            "example",
            "name: example\nschedule:\n  start: \"0 0 * * *\"\nsteps:\n  - name: s1\n    command: \"true\"\n",
        );

        let clock: Arc<dyn Clock> = Arc::new(FrozenClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let job = Arc::new(RecordingJob::default());
        let dirs = SchedulerDirs {
            dags_dir,
            data_dir: root.path().join("data"),
            socket_dir: root.path().join("sock"),
            suspend_dir: root.path().join("suspend"),
            queue_dir: root.path().join("queue"),
        };
        let scheduler = Scheduler::new(clock, job.clone(), dirs);
        scheduler.tick().await.unwrap();

        // fired entries dispatch onto their own tokio task; give them a turn.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(job.started.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tick_skips_suspended_dags() {
        let root = tempfile::tempdir().unwrap();
        let dags_dir = root.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        let dag_path = write_dag(
            &dags_dir,
            "example",
            "name: example\nschedule:\n  start: \"0 0 * * *\"\nsteps:\n  - name: s1\n    command: \"true\"\n",
        );

        let clock: Arc<dyn Clock> = Arc::new(FrozenClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let job = Arc::new(RecordingJob::default());
        let dirs = SchedulerDirs {
            dags_dir,
            data_dir: root.path().join("data"),
            socket_dir: root.path().join("sock"),
            suspend_dir: root.path().join("suspend"),
            queue_dir: root.path().join("queue"),
        };
        let suspend = SuspendStore::new(dirs.suspend_dir.clone());
        suspend.suspend(&dag_path).unwrap();

        let scheduler = Scheduler::new(clock, job.clone(), dirs);
        scheduler.tick().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(job.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_ignores_dags_without_a_schedule() {
        let root = tempfile::tempdir().unwrap();
        let dags_dir = root.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        write_dag(
            &dags_dir,
            "unscheduled",
            "name: unscheduled\nsteps:\n  - name: s1\n    command: \"true\"\n",
        );

        let clock: Arc<dyn Clock> = Arc::new(FrozenClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let job = Arc::new(RecordingJob::default());
        let dirs = SchedulerDirs {
            dags_dir,
            data_dir: root.path().join("data"),
            socket_dir: root.path().join("sock"),
            suspend_dir: root.path().join("suspend"),
            queue_dir: root.path().join("queue"),
        };
        let scheduler = Scheduler::new(clock, job.clone(), dirs);
        scheduler.tick().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(job.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_drains_queued_request_when_no_run_is_active() {
        let root = tempfile::tempdir().unwrap();
        let dags_dir = root.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        let dag_path = write_dag(
            &dags_dir,
            "example",
            "name: example\nsteps:\n  - name: s1\n    command: \"true\"\n",
        );

        let dirs = SchedulerDirs {
            dags_dir,
            data_dir: root.path().join("data"),
            socket_dir: root.path().join("sock"),
            suspend_dir: root.path().join("suspend"),
            queue_dir: root.path().join("queue"),
        };
        let queue = QueueStore::new(dirs.queue_dir.clone());
        queue
            .enqueue(&dag_path, "queued-1", "{\"dagRunId\":\"queued-1\",\"params\":\"x=1\"}")
            .unwrap();

        let clock: Arc<dyn Clock> = Arc::new(FrozenClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let job = Arc::new(RecordingJob::default());
        let scheduler = Scheduler::new(clock, job.clone(), dirs);
        scheduler.tick().await.unwrap();

        let started = job.started.lock().unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].1, "queued-1");
    }

    #[tokio::test]
    async fn tick_leaves_queue_alone_while_a_run_is_active() {
        use crate::history::{RunState, Snapshot, Store};
        use crate::node::Node;
        use crate::socket::{path_for, Server, StatusView};
        use std::collections::HashMap;
        use tokio::sync::{oneshot, watch};

        let root = tempfile::tempdir().unwrap();
        let dags_dir = root.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        let dag_path = write_dag(
            &dags_dir,
            "example",
            "name: example\nsteps:\n  - name: s1\n    command: \"true\"\n",
        );

        let dirs = SchedulerDirs {
            dags_dir,
            data_dir: root.path().join("data"),
            socket_dir: root.path().join("sock"),
            suspend_dir: root.path().join("suspend"),
            queue_dir: root.path().join("queue"),
        };
        let queue = QueueStore::new(dirs.queue_dir.clone());
        queue
            .enqueue(&dag_path, "queued-1", "{\"dagRunId\":\"queued-1\"}")
            .unwrap();

        let clock: Arc<dyn Clock> = Arc::new(FrozenClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
        let store = Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone());
        let running = Snapshot {
            name: "example".to_string(),
            dag_run_id: "run-0".to_string(),
            root: None,
            parent: None,
            status: RunState::Running,
            pid: None,
            created_at: clock.now(),
            queued_at: None,
            started_at: Some(clock.now()),
            finished_at: None,
            log: None,
            params: None,
            nodes: HashMap::from([("s1".to_string(), Node::new("s1"))]),
            handler_nodes: HashMap::new(),
        };
        let mut writer = store.open(&dag_path, "run-0").unwrap();
        writer.append(&running).await.unwrap();
        drop(writer);

        // A live control socket for the DAG is what makes the liveness probe
        // see this run as genuinely active, not a stale crashed record.
        let (_status_tx, status_rx) = watch::channel(StatusView::new(running));
        let (stop_tx, _stop_rx) = oneshot::channel();
        let socket_path = path_for(&dirs.socket_dir, &dag_path);
        let server = Server::bind(socket_path, status_rx, stop_tx).await.unwrap();
        tokio::spawn(server.serve());

        let job = Arc::new(RecordingJob::default());
        let scheduler = Scheduler::new(clock, job.clone(), dirs.clone());
        scheduler.tick().await.unwrap();

        assert!(job.started.lock().unwrap().is_empty());
        assert_eq!(queue.len(&dag_path), 1);
    }
}
