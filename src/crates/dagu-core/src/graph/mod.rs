//! The Execution Graph Engine: derives a runnable graph from a [`Dag`],
//! drives its steps to completion through a bounded worker pool, and reports
//! the overall run status.

mod condition;
mod execute;

pub use condition::{dependency_clears, evaluate_preconditions};
pub use execute::{cancel_active, execute_node, ActiveExecutors, ExecCtx};

use crate::dag::{validate::ancestor_sets, validate::validate_steps, Dag, DagError};
use crate::executor::{Registry, Signal};
use crate::node::{Node, NodeStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, Semaphore};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Dag(#[from] DagError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum GraphEvent {
    NodeStarted { step: String },
    NodeTerminal { step: String, status: NodeStatus },
    GraphTerminal { status: RunStatus },
}

/// The identity and I/O context a run executes under: what the teacher would
/// have reached into global state for, made an explicit value instead.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub dag_name: String,
    pub dag_run_id: String,
    pub root: Option<String>,
    pub parent: Option<String>,
    pub log_dir: PathBuf,
    pub dag_env: HashMap<String, String>,
}

pub struct NestedRunResult {
    pub status: NodeStatus,
    pub outputs: HashMap<String, serde_json::Value>,
}

/// Runs a nested DAG (a step with a `run:` reference) to completion and
/// reports back its terminal status and captured outputs. The agent
/// implements this to allocate a child run identity and drive a child
/// [`Graph`]; the graph engine itself stays agnostic of how that happens.
#[async_trait]
pub trait NestedRunner: Send + Sync {
    async fn run(
        &self,
        dag_path: &str,
        params: Option<String>,
    ) -> Result<NestedRunResult, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct Graph {
    dag: Arc<Dag>,
    registry: Arc<Registry>,
    nested: Option<Arc<dyn NestedRunner>>,
    run_ctx: Arc<RunContext>,
    ancestors: HashMap<String, HashSet<String>>,
    nodes: Arc<AsyncMutex<HashMap<String, Node>>>,
    /// Steps whose worker task is currently running. A node keeps its
    /// NotStarted entry in `nodes` until its task writes back the terminal
    /// result, so this set is what actually tells the dispatch loop and the
    /// completion check "this one is spoken for".
    in_flight: Arc<AsyncMutex<HashSet<String>>>,
    active: ActiveExecutors,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Graph {
    pub fn new(
        dag: Arc<Dag>,
        registry: Arc<Registry>,
        nested: Option<Arc<dyn NestedRunner>>,
        run_ctx: RunContext,
        seed_nodes: Option<Vec<Node>>,
    ) -> Result<Self, GraphError> {
        validate_steps(&dag.steps)?;
        let ancestors = ancestor_sets(&dag.steps);

        let mut nodes = HashMap::new();
        for step in &dag.steps {
            nodes.insert(step.name.clone(), Node::new(step.name.clone()));
        }
        if let Some(seeds) = seed_nodes {
            for seeded in seeds {
                if nodes.contains_key(&seeded.step_name) {
                    nodes.insert(seeded.step_name.clone(), seeded.seeded_for_retry());
                }
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Self {
            dag,
            registry,
            nested,
            run_ctx: Arc::new(run_ctx),
            ancestors,
            nodes: Arc::new(AsyncMutex::new(nodes)),
            in_flight: Arc::new(AsyncMutex::new(HashSet::new())),
            active: Arc::new(AsyncMutex::new(HashMap::new())),
            cancel_tx,
            cancel_rx,
        })
    }

    /// Signals cancellation. The running loop observes this on its next
    /// iteration; active executors are killed by a background watcher.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub async fn snapshot_nodes(&self) -> HashMap<String, Node> {
        self.nodes.lock().await.clone()
    }

    /// Drives every step to a terminal status and returns the overall run
    /// status. Emits a [`GraphEvent`] for every node transition plus one
    /// final [`GraphEvent::GraphTerminal`].
    pub async fn run(&self, events: mpsc::UnboundedSender<GraphEvent>) -> RunStatus {
        let semaphore = Arc::new(Semaphore::new(self.dag.max_active_steps()));
        let (term_tx, mut term_rx) = mpsc::unbounded_channel::<()>();

        {
            let mut cancel_rx = self.cancel_rx.clone();
            let active = self.active.clone();
            let max_clean_up = self.dag.max_clean_up_time;
            tokio::spawn(async move {
                if cancel_rx.changed().await.is_ok() && *cancel_rx.borrow() {
                    cancel_active(&active, Signal::Term, max_clean_up).await;
                }
            });
        }

        loop {
            let (skip_now, ready_now) = self.compute_dispatch_sets().await;

            for name in skip_now {
                let mut nodes = self.nodes.lock().await;
                if let Some(node) = nodes.get_mut(&name) {
                    let _ = node.mark_skipped();
                }
                let _ = events.send(GraphEvent::NodeTerminal {
                    step: name,
                    status: NodeStatus::Skipped,
                });
            }

            if !ready_now.is_empty() {
                for name in ready_now {
                    let step = self.dag.step(&name).cloned().unwrap();
                    let node = { self.nodes.lock().await.get(&name).cloned().unwrap() };
                    self.in_flight.lock().await.insert(name.clone());
                    let ancestor_outputs = self.ancestor_outputs(&name).await;
                    let ctx = ExecCtx {
                        run: self.run_ctx.clone(),
                        registry: self.registry.clone(),
                        nested: self.nested.clone(),
                        active: self.active.clone(),
                        events: events.clone(),
                    };
                    let semaphore = semaphore.clone();
                    let nodes = self.nodes.clone();
                    let in_flight = self.in_flight.clone();
                    let term_tx = term_tx.clone();
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        let finished = execute_node(&step, node, ancestor_outputs, &ctx).await;
                        nodes.lock().await.insert(step.name.clone(), finished);
                        in_flight.lock().await.remove(&step.name);
                        let _ = term_tx.send(());
                    });
                }
                continue;
            }

            let all_terminal = {
                let nodes = self.nodes.lock().await;
                self.in_flight.lock().await.is_empty() && nodes.values().all(|n| n.is_terminal())
            };
            if all_terminal {
                break;
            }

            let _ = term_rx.recv().await;
        }

        let status = self.overall_status().await;
        self.run_handlers(status, &events).await;
        let _ = events.send(GraphEvent::GraphTerminal { status });
        status
    }

    async fn compute_dispatch_sets(&self) -> (Vec<String>, Vec<String>) {
        let nodes = self.nodes.lock().await;
        let in_flight = self.in_flight.lock().await;
        let cancelled = *self.cancel_rx.borrow();
        let mut skip = Vec::new();
        let mut ready = Vec::new();

        for step in &self.dag.steps {
            if in_flight.contains(&step.name) {
                continue;
            }
            let node = match nodes.get(&step.name) {
                Some(n) if n.status == NodeStatus::NotStarted => n,
                _ => continue,
            };
            if cancelled {
                // Cancellation freezes the ready set: never-started nodes
                // stay NotStarted rather than being dispatched or skipped.
                continue;
            }
            let mut all_terminal = true;
            let mut all_cleared = true;
            for dep in &step.depends {
                match nodes.get(dep) {
                    Some(d) if d.is_terminal() => {
                        if !dependency_clears(d, &step.continue_on) {
                            all_cleared = false;
                        }
                    }
                    _ => {
                        all_terminal = false;
                    }
                }
            }
            if !all_terminal {
                continue;
            }
            if all_cleared {
                ready.push(step.name.clone());
            } else {
                skip.push(step.name.clone());
            }
        }
        (skip, ready)
    }

    async fn ancestor_outputs(&self, step_name: &str) -> HashMap<String, serde_json::Value> {
        let nodes = self.nodes.lock().await;
        let mut merged = HashMap::new();
        if let Some(ancestors) = self.ancestors.get(step_name) {
            for ancestor in ancestors {
                if let Some(node) = nodes.get(ancestor) {
                    merged.extend(node.output_variables.clone());
                }
            }
        }
        merged
    }

    async fn overall_status(&self) -> RunStatus {
        if *self.cancel_rx.borrow() {
            return RunStatus::Cancelled;
        }
        let nodes = self.nodes.lock().await;
        let any_failed = self.dag.steps.iter().any(|step| {
            nodes
                .get(&step.name)
                .map(|n| n.status == NodeStatus::Failed && !step.continue_on.mark_success)
                .unwrap_or(false)
        });
        if any_failed {
            RunStatus::Failed
        } else {
            RunStatus::Success
        }
    }

    /// Runs at most one terminal-status handler plus the unconditional
    /// `onExit` handler, sequentially. Handler failures are recorded but
    /// never change the run's overall status.
    async fn run_handlers(&self, status: RunStatus, events: &mpsc::UnboundedSender<GraphEvent>) {
        let handler = match status {
            RunStatus::Success => self.dag.handler_on.success.as_ref(),
            RunStatus::Failed => self.dag.handler_on.failure.as_ref(),
            RunStatus::Cancelled => self.dag.handler_on.cancel.as_ref(),
        };
        for step in handler.into_iter().chain(self.dag.handler_on.exit.as_ref()) {
            let node = Node::new(step.name.clone());
            let ctx = ExecCtx {
                run: self.run_ctx.clone(),
                registry: self.registry.clone(),
                nested: self.nested.clone(),
                active: self.active.clone(),
                events: events.clone(),
            };
            let finished = execute_node(step, node, HashMap::new(), &ctx).await;
            self.nodes.lock().await.insert(step.name.clone(), finished);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{load, LoadOptions};

    fn build_graph(yaml: &str, dir: &tempfile::TempDir) -> Graph {
        let dag = load_from_str(yaml, dir);
        let run_ctx = RunContext {
            dag_name: dag.name.clone(),
            dag_run_id: "test-run".to_string(),
            root: None,
            parent: None,
            log_dir: dir.path().to_path_buf(),
            dag_env: HashMap::new(),
        };
        Graph::new(Arc::new(dag), Arc::new(Registry::new()), None, run_ctx, None).unwrap()
    }

    fn load_from_str(yaml: &str, dir: &tempfile::TempDir) -> Dag {
        let path = dir.path().join("dag.yaml");
        std::fs::write(&path, yaml).unwrap();
        load(&path, &LoadOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn empty_dag_completes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "name: empty\nsteps: []\n";
        let graph = build_graph(yaml, &dir);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(graph.run(tx).await, RunStatus::Success);
    }
}
