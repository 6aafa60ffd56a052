use uuid::Uuid;

/// A run's identity and place in the nested-run hierarchy. `root` equal to
/// `dag_run_id` marks a top-level run.
#[derive(Debug, Clone)]
pub struct RunIdentity {
    pub name: String,
    pub dag_run_id: String,
    pub root: Option<String>,
    pub parent: Option<String>,
}

impl RunIdentity {
    /// A fresh top-level run: `dag_run_id` generated if not supplied, and
    /// `root` set to itself.
    pub fn top_level(name: impl Into<String>, dag_run_id: Option<String>) -> Self {
        let dag_run_id = dag_run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            name: name.into(),
            root: Some(dag_run_id.clone()),
            dag_run_id,
            parent: None,
        }
    }

    /// A nested run spawned from a step's `run:` reference.
    pub fn nested(name: impl Into<String>, parent: &RunIdentity) -> Self {
        Self {
            name: name.into(),
            dag_run_id: Uuid::new_v4().to_string(),
            root: parent.root.clone(),
            parent: Some(parent.dag_run_id.clone()),
        }
    }
}
