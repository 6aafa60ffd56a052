//! End-to-end: a step that fails its first two attempts and succeeds on the
//! third, under a retry policy that allows exactly that many attempts.

use dagu_core::agent::{self, AgentDirs, RunIdentity};
use dagu_core::dag::{load, LoadOptions};
use dagu_core::history::Store;
use dagu_core::{NodeStatus, RunStatus};
use std::sync::Arc;

#[tokio::test]
async fn third_attempt_succeeds_within_the_retry_limit() {
    let root = tempfile::tempdir().unwrap();
    let marker = root.path().join("attempts");
    std::fs::write(&marker, "0").unwrap();

    let dag_path = root.path().join("retry.yaml");
    std::fs::write(
        &dag_path,
        format!(
            "name: retry\nsteps:\n  - name: flaky\n    command: \"n=$(cat {marker}); n=$((n+1)); echo $n > {marker}; test $n -ge 3\"\n    retryPolicy:\n      limit: 3\n      intervalSec: 0\n",
            marker = marker.display()
        ),
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
    assert_eq!(outcome.status, RunStatus::Success);

    let store = Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone());
    let snapshot = store.latest_today(&dag_path).await.unwrap();
    let flaky = &snapshot.nodes["flaky"];
    assert_eq!(flaky.status, NodeStatus::Success);
    assert_eq!(flaky.retry_count, 2);
}
