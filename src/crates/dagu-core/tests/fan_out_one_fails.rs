//! End-to-end: one of two siblings fails; the run is Failed overall but the
//! sibling that didn't depend on the failure still reaches Success.

use dagu_core::agent::{self, AgentDirs, RunIdentity};
use dagu_core::dag::{load, LoadOptions};
use dagu_core::history::Store;
use dagu_core::{NodeStatus, RunStatus};
use std::sync::Arc;

#[tokio::test]
async fn one_failing_sibling_does_not_block_the_other() {
    let root = tempfile::tempdir().unwrap();
    let dag_path = root.path().join("fanout.yaml");
    std::fs::write(
        &dag_path,
        "name: fanout\nsteps:\n  - name: s1\n    command: \"true\"\n  - name: s2a\n    command: \"false\"\n    depends: [\"s1\"]\n  - name: s2b\n    command: \"true\"\n    depends: [\"s1\"]\n",
    )
    .unwrap();

    let dag = load(&dag_path, &LoadOptions::default()).unwrap();
    let identity = RunIdentity::top_level(dag.name.clone(), None);
    let dirs = Arc::new(AgentDirs {
        log_dir: root.path().join("logs"),
        socket_dir: root.path().join("sock"),
        data_dir: root.path().join("data"),
    });

    let outcome = agent::run(dag, identity, dirs.clone(), None, None).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);

    let store = Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone());
    let snapshot = store.latest_today(&dag_path).await.unwrap();
    let s2a = &snapshot.nodes["s2a"];
    let s2b = &snapshot.nodes["s2b"];
    assert_eq!(s2a.status, NodeStatus::Failed);
    assert!(s2a.error.is_some());
    assert_eq!(s2b.status, NodeStatus::Success);
}
