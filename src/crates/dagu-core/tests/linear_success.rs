//! End-to-end: two steps in sequence both succeed, the second starts no
//! earlier than the first finishes, and the run's history file captures at
//! least the NotStarted → Running → Success transitions.

use dagu_core::agent::{self, AgentDirs, RunIdentity};
use dagu_core::dag::{load, LoadOptions};
use dagu_core::history::Store;
use dagu_core::{NodeStatus, RunStatus};
use std::sync::Arc;

#[tokio::test]
async fn two_dependent_steps_both_succeed_in_order() {
    let root = tempfile::tempdir().unwrap();
    let dag_path = root.path().join("linear.yaml");
    std::fs::write(
        &dag_path,
        "name: linear\nsteps:\n  - name: s1\n    command: \"echo A\"\n  - name: s2\n    command: \"echo B\"\n    depends: [\"s1\"]\n",
    )
    .unwrap();

    let dag = load(&dag_path, &LoadOptions::default()).unwrap();
    let identity = RunIdentity::top_level(dag.name.clone(), Some("run-1".to_string()));
    let dirs = Arc::new(AgentDirs {
        log_dir: root.path().join("logs"),
        socket_dir: root.path().join("sock"),
        data_dir: root.path().join("data"),
    });

    let outcome = agent::run(dag, identity, dirs.clone(), None, None).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Success);

    let store = Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone());
    let final_snapshot = store.latest_today(&dag_path).await.unwrap();
    let s1 = &final_snapshot.nodes["s1"];
    let s2 = &final_snapshot.nodes["s2"];
    assert_eq!(s1.status, NodeStatus::Success);
    assert_eq!(s2.status, NodeStatus::Success);
    assert!(s2.started_at.unwrap() >= s1.finished_at.unwrap());

    // At least NotStarted, Running, and the final Success snapshot were
    // appended to the run's history file.
    let dag_dir = dirs.data_dir.join(dagu_core::hashpath::hash_path(&dag_path));
    let dat_file = std::fs::read_dir(&dag_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().map(|ext| ext == "dat").unwrap_or(false))
        .expect("history file for this run");
    let line_count = std::fs::read_to_string(&dat_file).unwrap().lines().count();
    assert!(line_count >= 3, "expected at least 3 snapshots, got {line_count}");
}
