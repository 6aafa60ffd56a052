//! A [`Node`] is one step's record within a running (or completed) DAG: its
//! status, timing, and captured output. The state machine enforces that a
//! terminal status is never left, mirroring the invariant the teacher's
//! `Task::update_status` already enforced for task lifecycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodeStatus {
    NotStarted,
    Running,
    Success,
    Failed,
    Cancelled,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Success | NodeStatus::Failed | NodeStatus::Cancelled | NodeStatus::Skipped
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("cannot transition node {name:?} out of terminal state {from} to {to}")]
    TerminalStateExited {
        name: String,
        from: NodeStatus,
        to: NodeStatus,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubRun {
    pub dag_run_id: String,
    pub params: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub step_name: String,
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub retried_at: Option<DateTime<Utc>>,
    pub done_count: u32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub output_variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub sub_runs: Vec<SubRun>,
}

impl Node {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: NodeStatus::NotStarted,
            started_at: None,
            finished_at: None,
            retry_count: 0,
            retried_at: None,
            done_count: 0,
            stdout: None,
            stderr: None,
            error: None,
            exit_code: None,
            output_variables: HashMap::new(),
            sub_runs: Vec::new(),
        }
    }

    /// Seeds a node from a previously persisted snapshot, e.g. for a
    /// `dagu retry` run: done work is kept, the status is reset so the
    /// scheduling loop will re-evaluate it.
    pub fn seeded_for_retry(mut self) -> Self {
        if self.status != NodeStatus::Success {
            self.status = NodeStatus::NotStarted;
            self.finished_at = None;
            self.error = None;
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: NodeStatus) -> Result<(), NodeError> {
        if self.status.is_terminal() {
            return Err(NodeError::TerminalStateExited {
                name: self.step_name.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn mark_skipped(&mut self) -> Result<(), NodeError> {
        self.transition(NodeStatus::Skipped)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), NodeError> {
        self.transition(NodeStatus::Running)?;
        self.started_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    pub fn mark_success(&mut self, exit_code: i32) -> Result<(), NodeError> {
        self.exit_code = Some(exit_code);
        self.transition(NodeStatus::Success)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, exit_code: i32, error: impl Into<String>) -> Result<(), NodeError> {
        self.exit_code = Some(exit_code);
        self.error = Some(error.into());
        self.transition(NodeStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_cancelled(&mut self) -> Result<(), NodeError> {
        if self.status == NodeStatus::NotStarted {
            // Never-started nodes stay NotStarted per the cancellation contract.
            return Ok(());
        }
        self.transition(NodeStatus::Cancelled)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_retry(&mut self) {
        self.retry_count += 1;
        self.retried_at = Some(Utc::now());
        self.status = NodeStatus::NotStarted;
    }

    pub fn record_repeat(&mut self) {
        self.done_count += 1;
        self.status = NodeStatus::NotStarted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cannot_leave_terminal_state() {
        let mut node = Node::new("a");
        node.mark_running().unwrap();
        node.mark_success(0).unwrap();
        assert!(node.mark_failed(1, "boom").is_err());
    }

    #[test]
    fn retry_resets_running_node_to_not_started() {
        let mut node = Node::new("a");
        node.mark_running().unwrap();
        node.record_retry();
        assert_eq!(node.status, NodeStatus::NotStarted);
        assert_eq!(node.retry_count, 1);
        // A node reset for retry is no longer terminal and can run again.
        node.mark_running().unwrap();
        node.mark_success(0).unwrap();
    }

    #[test]
    fn never_started_stays_not_started_on_cancel() {
        let mut node = Node::new("a");
        node.mark_cancelled().unwrap();
        assert_eq!(node.status, NodeStatus::NotStarted);
    }

    #[test]
    fn skip_then_terminal_rejects_further_transitions() {
        let mut node = Node::new("a");
        node.mark_skipped().unwrap();
        assert!(node.mark_running().is_err());
    }
}
