//! End-to-end: a `skipIfSuccessful` schedule entry fires on two consecutive
//! ticks but only spawns once, because the first tick's run is recorded as
//! a success before the second tick evaluates the same entry.

use dagu_core::scheduler::{Clock, FrozenClock, Job, Scheduler, SchedulerDirs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingJob {
    started: Mutex<Vec<(PathBuf, String)>>,
}

impl Job for RecordingJob {
    fn start(&self, dag_path: &Path, run_id: &str, _params: Option<&str>) -> dagu_core::scheduler::Result<()> {
        self.started
            .lock()
            .unwrap()
            .push((dag_path.to_path_buf(), run_id.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn skip_if_successful_spawns_only_once_across_two_ticks() {
    use dagu_core::history::{RunState, Snapshot, Store};
    use dagu_core::node::Node;
    use std::collections::HashMap;

    let root = tempfile::tempdir().unwrap();
    let dags_dir = root.path().join("dags");
    std::fs::create_dir_all(&dags_dir).unwrap();
    let dag_path = dags_dir.join("example.yaml");
    std::fs::write(
        &dag_path,
        "name: example\nschedule:\n  start: \"* * * * *\"\n  skipIfSuccessful: true\nsteps:\n  - name: s1\n    command: \"true\"\n",
    )
    .unwrap();

    let clock = Arc::new(FrozenClock::new("2024-01-01T00:00:00Z".parse().unwrap()));
    let job = Arc::new(RecordingJob::default());
    let dirs = SchedulerDirs {
        dags_dir,
        data_dir: root.path().join("data"),
        socket_dir: root.path().join("sock"),
        suspend_dir: root.path().join("suspend"),
        queue_dir: root.path().join("queue"),
    };
    let clock_dyn: Arc<dyn Clock> = clock.clone();
    let job_dyn: Arc<dyn Job> = job.clone();
    let scheduler = Scheduler::new(clock_dyn, job_dyn, dirs.clone());

    scheduler.tick().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(job.started.lock().unwrap().len(), 1);

    // The first run finishes successfully, started at-or-after this tick.
    let store = Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone());
    let mut writer = store.open(&dag_path, "run-1").unwrap();
    writer
        .append(&Snapshot {
            name: "example".to_string(),
            dag_run_id: "run-1".to_string(),
            root: None,
            parent: None,
            status: RunState::Success,
            pid: None,
            created_at: clock.now(),
            queued_at: None,
            started_at: Some(clock.now()),
            finished_at: Some(clock.now()),
            log: None,
            params: None,
            nodes: HashMap::from([("s1".to_string(), Node::new("s1"))]),
            handler_nodes: HashMap::new(),
        })
        .await
        .unwrap();
    drop(writer);

    clock.advance(chrono::Duration::minutes(1));
    scheduler.tick().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    // Still just the one spawn from the first tick: the second tick's due
    // entry is skipped because a success was already recorded.
    assert_eq!(job.started.lock().unwrap().len(), 1);
}
