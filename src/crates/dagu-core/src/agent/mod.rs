//! The Agent (C7): the per-run supervisor. Parses a DAG, binds a run
//! identity, serves the control socket, drives the Execution Graph to
//! completion, and streams Status Snapshots into the History Store.
//!
//! Nested DAG runs (a step's `run:` reference) are driven in-process rather
//! than by spawning a second OS process: the [`AgentNestedRunner`] simply
//! recurses into [`run`] with a freshly allocated child [`RunIdentity`]. The
//! externally observable contract — a child run identity, its own control
//! socket and History Store entries, terminal-status propagation, output
//! hoisting, cascading cancellation — is unchanged; only the process
//! boundary is collapsed.

mod error;
mod identity;

pub use error::{AgentError, Result};
pub use identity::RunIdentity;

use crate::dag::{load, Dag, LoadOptions};
use crate::executor::Registry;
use crate::graph::{Graph, GraphEvent, NestedRunResult, NestedRunner, RunContext, RunStatus};
use crate::history::{RunState, Snapshot, Store};
use crate::node::NodeStatus;
use crate::socket::{path_for, Server, SocketError, StatusView};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};

/// Directory roots the Agent needs, shared with every nested run it spawns.
#[derive(Debug, Clone)]
pub struct AgentDirs {
    pub log_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub data_dir: PathBuf,
}

/// The coalescing interval for non-terminal snapshot flushes. Terminal node
/// transitions always flush immediately regardless of this.
const SNAPSHOT_COALESCE_INTERVAL: Duration = Duration::from_millis(250);

pub struct AgentOutcome {
    pub status: RunStatus,
    pub exit_code: i32,
    pub outputs: HashMap<String, serde_json::Value>,
}

/// Runs one DAG to completion under `identity`, returning its overall
/// status and exit code. This is the Agent's entire startup-through-exit
/// sequence; callers (the CLI's `start` command, the Scheduler, or a
/// parent Agent's nested-run call) all funnel through here.
pub async fn run(
    dag: Dag,
    identity: RunIdentity,
    dirs: Arc<AgentDirs>,
    params: Option<String>,
    seed_nodes: Option<Vec<crate::node::Node>>,
) -> Result<AgentOutcome> {
    let dag = Arc::new(dag);
    let dag_path = crate::dag::identity_path(&dag);

    let run_log_dir = dirs
        .log_dir
        .join(&dag.name)
        .join(&identity.dag_run_id);
    std::fs::create_dir_all(&run_log_dir)?;

    let mut snapshot = Snapshot::not_started(dag.name.clone(), identity.dag_run_id.clone());
    snapshot.root = identity.root.clone();
    snapshot.parent = identity.parent.clone();
    snapshot.pid = Some(std::process::id());
    snapshot.params = params.clone();
    snapshot.log = Some(run_log_dir.join("agent.log").to_string_lossy().into_owned());

    // Keyed on the DAG's identity path, not this run's id: binding this
    // socket is what enforces "at most one Agent per DAG at a time".
    let socket_path = path_for(&dirs.socket_dir, &dag_path);
    let (status_tx, status_rx) = watch::channel(StatusView::new(snapshot.clone()));
    let (stop_tx, stop_rx) = oneshot::channel();
    let server = Server::bind(&socket_path, status_rx, stop_tx)
        .await
        .map_err(|e| match e {
            SocketError::RunAlreadyActive(p) => AgentError::RunAlreadyActive(p),
            other => other.into(),
        })?;
    let server_task = tokio::spawn(server.serve());

    let store = Store::new(dirs.data_dir.clone(), dirs.socket_dir.clone());
    let mut writer = store.open(&dag_path, &identity.dag_run_id)?;

    writer.append(&snapshot).await?;

    snapshot.status = RunState::Running;
    snapshot.started_at = Some(Utc::now());
    writer.append(&snapshot).await?;
    let _ = status_tx.send(StatusView::new(snapshot.clone()));

    let registry = Arc::new(Registry::new());
    let nested: Arc<dyn NestedRunner> = Arc::new(AgentNestedRunner {
        dirs: dirs.clone(),
        dags_dir: run_log_dir.clone(),
        parent_identity: identity.clone(),
    });
    let run_ctx = RunContext {
        dag_name: dag.name.clone(),
        dag_run_id: identity.dag_run_id.clone(),
        root: identity.root.clone(),
        parent: identity.parent.clone(),
        log_dir: run_log_dir.clone(),
        dag_env: dag.env.clone(),
    };
    let graph = Arc::new(Graph::new(dag.clone(), registry, Some(nested), run_ctx, seed_nodes)?);

    if !dag.delay.is_zero() {
        tokio::time::sleep(dag.delay).await;
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<GraphEvent>();
    let (run_done_tx, run_done_rx) = oneshot::channel();
    {
        let graph = graph.clone();
        tokio::spawn(async move {
            let status = graph.run(events_tx).await;
            let _ = run_done_tx.send(status);
        });
    }

    let watcher_task = spawn_cancellation_watcher(graph.clone(), stop_rx, dag.timeout);

    let mut last_flush = Instant::now() - SNAPSHOT_COALESCE_INTERVAL;
    loop {
        match events_rx.recv().await {
            None => break,
            Some(GraphEvent::GraphTerminal { .. }) => break,
            Some(GraphEvent::NodeTerminal { .. }) => {
                snapshot.nodes = graph.snapshot_nodes().await;
                writer.append(&snapshot).await?;
                let _ = status_tx.send(StatusView::new(snapshot.clone()));
                last_flush = Instant::now();
            }
            Some(GraphEvent::NodeStarted { .. }) => {
                let now = Instant::now();
                if now.duration_since(last_flush) >= SNAPSHOT_COALESCE_INTERVAL {
                    snapshot.nodes = graph.snapshot_nodes().await;
                    writer.append(&snapshot).await?;
                    let _ = status_tx.send(StatusView::new(snapshot.clone()));
                    last_flush = now;
                }
            }
        }
    }

    let status = run_done_rx.await.unwrap_or(RunStatus::Failed);
    snapshot.nodes = graph.snapshot_nodes().await;
    snapshot.status = match status {
        RunStatus::Success => RunState::Success,
        RunStatus::Failed => RunState::Failed,
        RunStatus::Cancelled => RunState::Cancelled,
    };
    snapshot.finished_at = Some(Utc::now());
    writer.append(&snapshot).await?;
    let _ = status_tx.send(StatusView::new(snapshot.clone()));

    // The run is done: stop watching for cancellation signals and close the
    // socket (Server's Drop unlinks it) and writer (releases the advisory
    // lock) before handing control back to the caller.
    watcher_task.abort();
    server_task.abort();
    drop(writer);

    let outputs = snapshot
        .nodes
        .values()
        .flat_map(|n| n.output_variables.clone())
        .collect();

    let exit_code = if status == RunStatus::Failed { 1 } else { 0 };
    Ok(AgentOutcome {
        status,
        exit_code,
        outputs,
    })
}

/// Watches for `POST /stop` (via `stop_rx`), SIGINT/SIGTERM, and the DAG's
/// context `timeout` (if any) together, cancelling the graph on whichever
/// fires first — the same cancellation path regardless of which one woke it.
fn spawn_cancellation_watcher(
    graph: Arc<Graph>,
    mut stop_rx: oneshot::Receiver<()>,
    timeout: Option<Duration>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
            let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
            tokio::select! {
                _ = &mut stop_rx => {}
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
                _ = deadline => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = stop_rx => {}
                _ = deadline => {}
            }
        }
        graph.cancel();
    })
}

/// Drives a nested (`run:`) DAG reference to completion in-process, under a
/// freshly allocated child [`RunIdentity`] whose `root`/`parent` lineage
/// chains back to the step that spawned it.
struct AgentNestedRunner {
    dirs: Arc<AgentDirs>,
    /// Directory the parent resolves relative nested DAG paths against —
    /// the parent's own run-log directory, matching how the parent itself
    /// was invoked with a path relative to its working directory.
    dags_dir: PathBuf,
    parent_identity: RunIdentity,
}

#[async_trait]
impl NestedRunner for AgentNestedRunner {
    async fn run(
        &self,
        dag_path: &str,
        params: Option<String>,
    ) -> std::result::Result<NestedRunResult, Box<dyn std::error::Error + Send + Sync>> {
        let resolved = resolve_nested_path(&self.dags_dir, dag_path);
        let dag = load(&resolved, &LoadOptions::default())?;
        let identity = RunIdentity::nested(dag.name.clone(), &self.parent_identity);

        let outcome = run(dag, identity, self.dirs.clone(), params, None).await?;
        let status = match outcome.status {
            RunStatus::Success => NodeStatus::Success,
            RunStatus::Failed => NodeStatus::Failed,
            RunStatus::Cancelled => NodeStatus::Cancelled,
        };
        Ok(NestedRunResult {
            status,
            outputs: outcome.outputs,
        })
    }
}

fn resolve_nested_path(base: &Path, dag_path: &str) -> PathBuf {
    let candidate = Path::new(dag_path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}
