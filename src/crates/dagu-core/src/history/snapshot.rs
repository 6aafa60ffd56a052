use crate::graph::RunStatus;
use crate::node::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RunState {
    NotStarted,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl From<RunStatus> for RunState {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::Success => RunState::Success,
            RunStatus::Failed => RunState::Failed,
            RunStatus::Cancelled => RunState::Cancelled,
        }
    }
}

/// One record in a run's history file: the run's full state as of one
/// status transition. The latest record in a run's file is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub dag_run_id: String,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    pub status: RunState,
    #[serde(default)]
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub handler_nodes: HashMap<String, Node>,
}

impl Snapshot {
    pub fn not_started(name: impl Into<String>, dag_run_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dag_run_id: dag_run_id.into(),
            root: None,
            parent: None,
            status: RunState::NotStarted,
            pid: None,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            finished_at: None,
            log: None,
            params: None,
            nodes: HashMap::new(),
            handler_nodes: HashMap::new(),
        }
    }
}
