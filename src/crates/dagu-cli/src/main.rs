//! `dagu` — start, stop, retry, restart, enqueue, dequeue runs, or run the
//! scheduler daemon. See the `dagu-core` crate for the engine itself; this
//! binary is just the process boundary around it.

use clap::{Parser, Subcommand};
use dagu_core::agent::{self, AgentDirs, RunIdentity};
use dagu_core::config::Paths;
use dagu_core::dag::{load, LoadOptions};
use dagu_core::history::{RunState, Store};
use dagu_core::queue::QueueStore;
use dagu_core::scheduler::{Scheduler, SchedulerDirs, SubprocessJob, SystemClock};
use dagu_core::socket::path_for;
use dagu_support::client::ControlClient;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dagu")]
#[command(version)]
#[command(about = "A Dagu-style workflow orchestration engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new run of a DAG.
    Start {
        dag: PathBuf,
        #[arg(long)]
        params: Option<String>,
        #[arg(long = "run-id")]
        run_id: Option<String>,
    },
    /// Request a running DAG to stop.
    Stop { dag: PathBuf },
    /// Re-run a previously finished run: steps that already succeeded are
    /// kept, the rest re-execute.
    Retry {
        dag: PathBuf,
        #[arg(long)]
        req: String,
    },
    /// Stop the current run (if any) and start a fresh one.
    Restart { dag: PathBuf },
    /// Add a run request to a DAG's pending queue.
    Enqueue {
        dag: PathBuf,
        #[arg(long = "run-id")]
        run_id: String,
        #[arg(long)]
        params: Option<String>,
    },
    /// Remove a pending run request from a DAG's queue.
    Dequeue {
        #[arg(long = "dag-run", value_name = "NAME:ID")]
        dag_run: String,
    },
    /// Run the scheduler daemon (C8): fires due start/stop/restart entries every tick.
    Scheduler,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::from(3)
        }
    }
}

async fn run(command: Command) -> anyhow::Result<ExitCode> {
    let paths = Paths::from_env();
    paths.ensure_dirs()?;
    let dirs = Arc::new(AgentDirs {
        log_dir: paths.log_dir.clone(),
        socket_dir: paths.socket_dir.clone(),
        data_dir: paths.data_dir.clone(),
    });

    match command {
        Command::Start {
            dag,
            params,
            run_id,
        } => {
            let parsed = load(&dag, &LoadOptions::default())?;
            let identity = RunIdentity::top_level(parsed.name.clone(), run_id);
            let outcome = agent::run(parsed, identity, dirs, params, None).await?;
            Ok(exit_for(outcome.exit_code))
        }

        Command::Stop { dag } => Ok(exit_for(stop_run(&paths, &dag).await?)),

        Command::Retry { dag, req } => {
            let parsed = load(&dag, &LoadOptions::default())?;
            let dag_path = dagu_core::dag::identity_path(&parsed);
            let store = Store::new(paths.data_dir.clone(), paths.socket_dir.clone());
            let snapshot = store.find_by_run_id(&dag_path, &req).await?;

            let identity = RunIdentity {
                name: parsed.name.clone(),
                dag_run_id: req.clone(),
                root: snapshot.root.clone().or_else(|| Some(req.clone())),
                parent: snapshot.parent.clone(),
            };
            let seed_nodes: Vec<_> = snapshot.nodes.into_values().collect();
            let outcome = agent::run(parsed, identity, dirs, snapshot.params, Some(seed_nodes)).await?;
            Ok(exit_for(outcome.exit_code))
        }

        Command::Restart { dag } => {
            // Best-effort: a DAG that isn't currently running has nothing to stop.
            let _ = stop_run(&paths, &dag).await;
            let parsed = load(&dag, &LoadOptions::default())?;
            let identity = RunIdentity::top_level(parsed.name.clone(), None);
            let outcome = agent::run(parsed, identity, dirs, None, None).await?;
            Ok(exit_for(outcome.exit_code))
        }

        Command::Enqueue {
            dag,
            run_id,
            params,
        } => {
            let queue = QueueStore::new(paths.queue_dir.clone());
            let payload = serde_json::json!({ "dagRunId": run_id, "params": params }).to_string();
            queue.enqueue(&dag, &run_id, &payload)?;
            Ok(ExitCode::from(0))
        }

        Command::Dequeue { dag_run } => {
            let Some((name, id)) = dag_run.split_once(':') else {
                eprintln!("--dag-run must be in the form <name>:<id>");
                return Ok(ExitCode::from(2));
            };
            let queue = QueueStore::new(paths.queue_dir.clone());
            let dag_path = paths.dags_dir.join(format!("{name}.yaml"));
            let removed = queue.remove(&dag_path, id)?;
            Ok(if removed {
                ExitCode::from(0)
            } else {
                ExitCode::from(1)
            })
        }

        Command::Scheduler => {
            let scheduler_dirs = SchedulerDirs {
                dags_dir: paths.dags_dir.clone(),
                data_dir: paths.data_dir.clone(),
                socket_dir: paths.socket_dir.clone(),
                suspend_dir: paths.suspend_dir.clone(),
                queue_dir: paths.queue_dir.clone(),
            };
            let binary = std::env::current_exe()?;
            let scheduler = Scheduler::new(
                Arc::new(SystemClock),
                Arc::new(SubprocessJob::new(binary)),
                scheduler_dirs,
            );
            scheduler.run_forever().await;
            Ok(ExitCode::from(0))
        }
    }
}

async fn stop_run(paths: &Paths, dag_path: &Path) -> anyhow::Result<i32> {
    let store = Store::new(paths.data_dir.clone(), paths.socket_dir.clone());
    let latest = store.latest_today(dag_path).await?;
    if latest.status != RunState::Running {
        return Ok(1);
    }
    let socket_path = path_for(&paths.socket_dir, dag_path);
    let client = ControlClient::default();
    client.post(&socket_path, "/stop", "").await?;
    Ok(0)
}

fn exit_for(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}
