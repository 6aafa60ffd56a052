//! The DAG data model: the pure, in-memory result of loading a DAG file.
//!
//! Everything here is plain data. Deriving a [`crate::graph::Graph`] from a
//! [`Dag`] is the only place behavior lives.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    While,
    Until,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub limit: u32,
    #[serde(default, rename = "intervalSec", with = "duration_secs")]
    pub interval: Duration,
    /// Exit codes eligible for retry. Empty means "any non-zero exit code".
    #[serde(default, rename = "exitCodes")]
    pub exit_codes: Vec<i32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 0,
            interval: Duration::ZERO,
            exit_codes: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Per the empty-list-means-any-nonzero rule.
    pub fn is_retriable(&self, exit_code: i32) -> bool {
        if exit_code == 0 {
            return false;
        }
        self.exit_codes.is_empty() || self.exit_codes.contains(&exit_code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatPolicy {
    #[serde(default = "default_repeat_mode")]
    pub mode: RepeatMode,
    #[serde(default)]
    pub limit: u32,
    #[serde(default, rename = "intervalSec", with = "duration_secs")]
    pub interval: Duration,
    /// Absent condition means "repeat until `limit` is reached".
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub expected: Option<String>,
}

fn default_repeat_mode() -> RepeatMode {
    RepeatMode::Fixed
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContinueOn {
    #[serde(default)]
    pub failure: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, rename = "exitCode")]
    pub exit_codes: Vec<i32>,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default, rename = "markSuccess")]
    pub mark_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precondition {
    pub condition: String,
    #[serde(default)]
    pub expected: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(rename = "type", default = "default_executor_type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_executor_type() -> String {
    "command".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: default_executor_type(),
            config: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default, deserialize_with = "env_map::deserialize")]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default, rename = "retryPolicy")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default, rename = "repeatPolicy")]
    pub repeat_policy: Option<RepeatPolicy>,
    #[serde(default, rename = "continueOn")]
    pub continue_on: ContinueOn,
    #[serde(default, rename = "signalOnStop")]
    pub signal_on_stop: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    /// Path to a nested DAG to run for this step, if any.
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default, with = "duration_secs_opt")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Start,
    Stop,
    Restart,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub start: Vec<String>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub restart: Vec<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, rename = "skipIfSuccessful")]
    pub skip_if_successful: bool,
    #[serde(default, rename = "restartWait", with = "duration_secs")]
    pub restart_wait: Duration,
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.stop.is_empty() && self.restart.is_empty()
    }

    pub fn exprs(&self, kind: ScheduleKind) -> &[String] {
        match kind {
            ScheduleKind::Start => &self.start,
            ScheduleKind::Stop => &self.stop,
            ScheduleKind::Restart => &self.restart,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerOn {
    #[serde(default)]
    pub success: Option<Step>,
    #[serde(default)]
    pub failure: Option<Step>,
    #[serde(default)]
    pub cancel: Option<Step>,
    #[serde(default)]
    pub exit: Option<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    #[serde(skip)]
    pub location: PathBuf,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, deserialize_with = "schedule_spec::deserialize")]
    pub schedule: Schedule,
    #[serde(default, rename = "handlerOn")]
    pub handler_on: HandlerOn,
    #[serde(default = "default_max_active_runs", rename = "maxActiveRuns")]
    pub max_active_runs: u32,
    #[serde(default, rename = "maxActiveSteps")]
    pub max_active_steps: u32,
    #[serde(default, rename = "histRetentionDays")]
    pub hist_retention_days: Option<u32>,
    #[serde(default, with = "duration_secs_opt")]
    pub timeout: Option<Duration>,
    #[serde(default, rename = "maxCleanUpTime", with = "duration_secs")]
    pub max_clean_up_time: Duration,
    #[serde(default, with = "duration_secs")]
    pub delay: Duration,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_max_active_runs() -> u32 {
    1
}

impl Dag {
    pub fn max_active_steps(&self) -> usize {
        if self.max_active_steps == 0 {
            self.steps.len().max(1)
        } else {
            self.max_active_steps as usize
        }
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Serde helper: durations expressed as plain seconds (`u64`) on the wire.
mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// `env:` accepts either a `KEY: value` map or a `- KEY=value` list.
mod env_map {
    use serde::{Deserialize, Deserializer};
    use std::collections::HashMap;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum EnvSpec {
        Map(HashMap<String, String>),
        List(Vec<String>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashMap<String, String>, D::Error> {
        let spec = Option::<EnvSpec>::deserialize(d)?;
        Ok(match spec {
            None => HashMap::new(),
            Some(EnvSpec::Map(m)) => m,
            Some(EnvSpec::List(items)) => items
                .into_iter()
                .filter_map(|entry| {
                    entry
                        .split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                })
                .collect(),
        })
    }
}

/// `schedule:` accepts a bare cron string, a list of cron strings (all
/// treated as `start` triggers), or the full `{start, stop, restart, ...}`
/// map.
mod schedule_spec {
    use super::Schedule;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ScheduleSpec {
        Single(String),
        List(Vec<String>),
        Full(Box<Schedule>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Schedule, D::Error> {
        let spec = Option::<ScheduleSpec>::deserialize(d)?;
        Ok(match spec {
            None => Schedule::default(),
            Some(ScheduleSpec::Single(expr)) => Schedule {
                start: vec![expr],
                ..Default::default()
            },
            Some(ScheduleSpec::List(exprs)) => Schedule {
                start: exprs,
                ..Default::default()
            },
            Some(ScheduleSpec::Full(full)) => *full,
        })
    }
}

mod duration_secs_opt {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}
