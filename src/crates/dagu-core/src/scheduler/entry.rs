use super::error::{Result, SchedulerError};
use crate::dag::{Dag, ScheduleKind};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Start,
    Stop,
    Restart,
}

impl From<ScheduleKind> for EntryKind {
    fn from(kind: ScheduleKind) -> Self {
        match kind {
            ScheduleKind::Start => EntryKind::Start,
            ScheduleKind::Stop => EntryKind::Stop,
            ScheduleKind::Restart => EntryKind::Restart,
        }
    }
}

/// One fireable schedule expression for one DAG at one tick.
#[derive(Debug, Clone)]
pub struct Entry {
    pub dag_name: String,
    pub dag_path: std::path::PathBuf,
    pub kind: EntryKind,
    pub next_fire: DateTime<Utc>,
    pub skip_if_successful: bool,
    pub restart_wait: Duration,
}

/// Builds one [`Entry`] per schedule expression on `dag`, using the next
/// occurrence on-or-after `tick - 1s` (the 1-second lookback makes a
/// schedule landing exactly on `tick` still fire this tick despite clock
/// jitter).
pub fn entries_for_dag(dag: &Dag, dag_path: &std::path::Path, tick: DateTime<Utc>) -> Result<Vec<Entry>> {
    let lookback = tick - Duration::seconds(1);
    let mut out = Vec::new();

    for kind in [ScheduleKind::Start, ScheduleKind::Stop, ScheduleKind::Restart] {
        for expr in dag.schedule.exprs(kind) {
            let cron = croner::Cron::new(expr)
                .parse()
                .map_err(|e| SchedulerError::InvalidCron(expr.clone(), e.to_string()))?;
            let next_fire = cron
                .find_next_occurrence(&lookback, false)
                .map_err(|e| SchedulerError::InvalidCron(expr.clone(), e.to_string()))?;
            out.push(Entry {
                dag_name: dag.name.clone(),
                dag_path: dag_path.to_path_buf(),
                kind: kind.into(),
                next_fire,
                skip_if_successful: dag.schedule.skip_if_successful,
                restart_wait: Duration::from_std(dag.schedule.restart_wait)
                    .unwrap_or(Duration::zero()),
            });
        }
    }

    out.sort_by_key(|e| e.next_fire);
    Ok(out)
}
