//! End-to-end: a parent step's `run:` reference to a child DAG, with the
//! child's captured output surfacing on the parent's Node.

use dagu_core::agent::{self, AgentDirs, RunIdentity};
use dagu_core::dag::{load, LoadOptions};
use std::sync::Arc;

#[tokio::test]
async fn parent_node_observes_child_output() {
    let root = tempfile::tempdir().unwrap();

    let child_path = root.path().join("child.yaml");
    std::fs::write(
        &child_path,
        "name: child\nsteps:\n  - name: e\n    command: \"echo hello\"\n    output: X\n",
    )
    .unwrap();

    let parent_path = root.path().join("parent.yaml");
    std::fs::write(
        &parent_path,
        format!(
            "name: parent\nsteps:\n  - name: p\n    run: \"{}\"\n    output: R\n",
            child_path.display()
        ),
    )
    .unwrap();

    let dag = load(&parent_path, &LoadOptions::default()).unwrap();
    let identity = RunIdentity::top_level(dag.name.clone(), None);
    let dirs = Arc::new(AgentDirs {
        log_dir: root.path().join("logs"),
        socket_dir: root.path().join("sock"),
        data_dir: root.path().join("data"),
    });

    let outcome = agent::run(dag, identity, dirs, None, None).await.unwrap();
    assert_eq!(outcome.status, dagu_core::RunStatus::Success);

    let r = outcome
        .outputs
        .get("R")
        .expect("parent step's output variable R was captured");
    assert_eq!(r.get("X").and_then(|v| v.as_str()), Some("hello"));
}
