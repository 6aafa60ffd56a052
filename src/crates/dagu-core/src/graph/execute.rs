//! The per-node execution sequence: variable expansion, dispatch to an
//! executor (or a nested DAG), output capture, and the retry/repeat loops.

use super::condition::{evaluate_preconditions, repeat_should_continue};
use super::{GraphEvent, NestedRunner, RunContext};
use crate::dag::Step;
use crate::executor::{Executor, Registry, Signal};
use crate::expand::{expand, ExpandContext};
use crate::node::Node;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

pub type ActiveExecutors = Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<Box<dyn Executor>>>>>>;

pub struct ExecCtx {
    pub run: Arc<RunContext>,
    pub registry: Arc<Registry>,
    pub nested: Option<Arc<dyn NestedRunner>>,
    pub active: ActiveExecutors,
    pub events: mpsc::UnboundedSender<GraphEvent>,
}

/// Runs one step's node to a terminal status, honoring its retry and repeat
/// policies. `ancestor_outputs` is the union of every transitive ancestor's
/// captured output variables, visible to this step's variable expansion.
pub async fn execute_node(
    step: &Step,
    mut node: Node,
    ancestor_outputs: HashMap<String, Value>,
    ctx: &ExecCtx,
) -> Node {
    let precond_ctx = ExpandContext {
        env: merged_env(step, ctx),
        outputs: ancestor_outputs.clone(),
    };
    if !evaluate_preconditions(&step.preconditions, &precond_ctx) {
        let _ = node.mark_skipped();
        return node;
    }

    let _ = node.mark_running();
    let _ = ctx.events.send(GraphEvent::NodeStarted {
        step: step.name.clone(),
    });

    loop {
        let (exit_code, error, stdout) = match step.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run_once(step, &ancestor_outputs, ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    kill_step(ctx, &step.name).await;
                    (-1, Some("step timed out".to_string()), None)
                }
            },
            None => run_once(step, &ancestor_outputs, ctx).await,
        };

        if let Some(var) = &step.output {
            let value = stdout
                .as_deref()
                .map(|s| serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
                .unwrap_or(Value::Null);
            node.output_variables.insert(var.clone(), value);
        }
        node.stdout = stdout;

        if exit_code != 0 {
            if let Some(retry) = &step.retry_policy {
                if retry.is_retriable(exit_code) && node.retry_count < retry.limit {
                    node.record_retry();
                    tokio::time::sleep(retry.interval).await;
                    continue;
                }
            }
            let _ = node.mark_failed(exit_code, error.unwrap_or_else(|| "non-zero exit".into()));
            break;
        }

        let _ = node.mark_success(exit_code);

        if let Some(repeat) = &step.repeat_policy {
            if node.done_count < repeat.limit || repeat.limit == 0 {
                let holds = match &repeat.condition {
                    Some(cond) => {
                        let ctx_expand = ExpandContext {
                            env: merged_env(step, ctx),
                            outputs: node.output_variables.clone(),
                        };
                        let actual = expand(cond, &ctx_expand);
                        match &repeat.expected {
                            Some(expected) => actual.contains(expected.as_str()),
                            None => !actual.is_empty() && actual != "false" && actual != "0",
                        }
                    }
                    // Per the "absent condition" rule: behave as an
                    // unconditional repeat until `limit` is reached.
                    None => true,
                };
                if repeat_should_continue(repeat.mode, holds) && node.done_count < repeat.limit {
                    node.record_repeat();
                    tokio::time::sleep(repeat.interval).await;
                    continue;
                }
            }
        }
        break;
    }

    let _ = ctx.events.send(GraphEvent::NodeTerminal {
        step: step.name.clone(),
        status: node.status,
    });
    node
}

/// Kills a timed-out step's executor, if it is still registered as active.
async fn kill_step(ctx: &ExecCtx, step_name: &str) {
    let exec = ctx.active.lock().await.get(step_name).cloned();
    if let Some(exec) = exec {
        let _ = exec.lock().await.kill(Signal::Term).await;
    }
}

async fn run_once(
    step: &Step,
    ancestor_outputs: &HashMap<String, Value>,
    ctx: &ExecCtx,
) -> (i32, Option<String>, Option<String>) {
    let env = merged_env(step, ctx);
    let expand_ctx = ExpandContext {
        env: env.clone(),
        outputs: ancestor_outputs.clone(),
    };

    if let Some(dag_path) = &step.run {
        return run_nested(step, dag_path, &expand_ctx, ctx).await;
    }

    let expanded_command = step.command.as_ref().map(|c| expand(c, &expand_ctx));
    let expanded_args: Vec<String> = step.args.iter().map(|a| expand(a, &expand_ctx)).collect();
    let mut expanded_step = step.clone();
    expanded_step.command = expanded_command;
    expanded_step.args = expanded_args;
    expanded_step.env = env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let stdout_path = ctx.run.log_dir.join(format!("{}.out", step.name));
    let stderr_path = ctx.run.log_dir.join(format!("{}.err", step.name));

    let executor = match ctx.registry.build(&expanded_step) {
        Ok(mut e) => {
            e.set_stdout(stdout_path.clone());
            e.set_stderr(stderr_path.clone());
            e
        }
        Err(err) => return (-1, Some(err.to_string()), None),
    };
    let executor = Arc::new(AsyncMutex::new(executor));
    ctx.active
        .lock()
        .await
        .insert(step.name.clone(), executor.clone());

    let exit_code = executor.lock().await.run().await;
    ctx.active.lock().await.remove(&step.name);

    let stdout = read_trimmed(&stdout_path);
    match exit_code {
        Ok(code) => (code, None, stdout),
        Err(err) => (-1, Some(err.to_string()), stdout),
    }
}

async fn run_nested(
    step: &Step,
    dag_path: &str,
    expand_ctx: &ExpandContext,
    ctx: &ExecCtx,
) -> (i32, Option<String>, Option<String>) {
    let Some(nested) = &ctx.nested else {
        return (
            -1,
            Some("nested dag execution is not configured".to_string()),
            None,
        );
    };
    let params = step.params.as_ref().map(|p| expand(p, expand_ctx));
    match nested.run(dag_path, params).await {
        Ok(result) => {
            let code = if result.status.is_terminal()
                && result.status == crate::node::NodeStatus::Success
            {
                0
            } else {
                1
            };
            let stdout = serde_json::to_string(&result.outputs).ok();
            (code, None, stdout)
        }
        Err(err) => (-1, Some(err.to_string()), None),
    }
}

fn read_trimmed(path: &PathBuf) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|mut s| {
        while s.ends_with('\n') || s.ends_with('\r') {
            s.pop();
        }
        s
    })
}

fn merged_env(step: &Step, ctx: &ExecCtx) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.extend(ctx.run.dag_env.clone());
    env.extend(step.env.clone());
    env.insert("DAG_NAME".to_string(), ctx.run.dag_name.clone());
    env.insert("DAG_RUN_ID".to_string(), ctx.run.dag_run_id.clone());
    env.insert(
        "DAG_RUN_LOG_FILE".to_string(),
        ctx.run.log_dir.join("agent.log").to_string_lossy().into_owned(),
    );
    env.insert("DAG_RUN_STEP_NAME".to_string(), step.name.clone());
    env.insert(
        "DAG_RUN_STEP_STDOUT_FILE".to_string(),
        ctx.run
            .log_dir
            .join(format!("{}.out", step.name))
            .to_string_lossy()
            .into_owned(),
    );
    env.insert(
        "DAG_RUN_STEP_STDERR_FILE".to_string(),
        ctx.run
            .log_dir
            .join(format!("{}.err", step.name))
            .to_string_lossy()
            .into_owned(),
    );
    env
}

/// Cancels every currently running node's executor, escalating from the
/// step's configured stop signal (default SIGTERM) to SIGKILL after
/// `max_clean_up_time`.
pub async fn cancel_active(active: &ActiveExecutors, signal: Signal, max_clean_up_time: std::time::Duration) {
    let snapshot: Vec<_> = active.lock().await.values().cloned().collect();
    for exec in &snapshot {
        let _ = exec.lock().await.kill(signal).await;
    }
    if snapshot.is_empty() {
        return;
    }
    tokio::time::sleep(max_clean_up_time).await;
    let still_running: Vec<_> = active.lock().await.values().cloned().collect();
    for exec in &still_running {
        let _ = exec.lock().await.kill(Signal::Kill).await;
    }
}
