//! End-to-end: a long-sleeping step is stopped from outside via the control
//! socket's `POST /stop`, and the run settles to Cancelled well inside its
//! clean-up budget.

use dagu_core::agent::{self, AgentDirs, RunIdentity};
use dagu_core::dag::{load, LoadOptions};
use dagu_core::history::Store;
use dagu_core::socket::path_for;
use dagu_core::{NodeStatus, RunStatus};
use dagu_support::client::ControlClient;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn stop_request_cancels_a_sleeping_step() {
    let root = tempfile::tempdir().unwrap();
    let dag_path = root.path().join("sleeper.yaml");
    std::fs::write(
        &dag_path,
        "name: sleeper\nmaxCleanUpTime: 5\nsteps:\n  - name: nap\n    command: \"sleep 60\"\n",
    )
    .unwrap();

    let dag = load(&dag_path, &LoadOptions::default()).unwrap();
    let identity = RunIdentity::top_level(dag.name.clone(), None);
    let dirs = Arc::new(AgentDirs {
        log_dir: root.path().join("logs"),
        socket_dir: root.path().join("sock"),
        data_dir: root.path().join("data"),
    });

    let run_dirs = dirs.clone();
    let run_dag_path = dag_path.clone();
    let handle = tokio::spawn(async move { agent::run(dag, identity, run_dirs, None, None).await });

    tokio::time::sleep(Duration::from_millis(500)).await;

    let socket_path = path_for(&dirs.socket_dir, &run_dag_path);
    let client = ControlClient::default();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if client.post(&socket_path, "/stop", "").await.is_ok() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("control socket never came up");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run did not settle within the clean-up budget")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Cancelled);

    let store = Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone());
    let snapshot = store.latest_today(&dag_path).await.unwrap();
    assert_eq!(snapshot.nodes["nap"].status, NodeStatus::Cancelled);
}
