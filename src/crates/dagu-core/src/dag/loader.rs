//! Loads a [`Dag`] from YAML bytes. The loader is a pure function of the
//! file content plus [`LoadOptions`] (it never reaches into global state).

use super::error::DagError;
use super::types::{Dag, ScheduleKind};
use super::validate::validate_steps;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Skip step-graph validation and only populate name/schedule/tags/
    /// description. Used by listings and the scheduler's directory scan,
    /// where parsing every step of every DAG on each tick would be wasteful.
    pub metadata_only: bool,
}

/// Parses a DAG from its YAML source. `location` is recorded on the result
/// but does not affect parsing.
pub fn parse(yaml: &str, location: &Path, opts: &LoadOptions) -> Result<Dag, DagError> {
    let mut dag: Dag = serde_yaml::from_str(yaml)?;
    dag.location = location.to_path_buf();
    if dag.name.is_empty() {
        dag.name = location
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    if opts.metadata_only {
        return Ok(dag);
    }

    validate_steps(&dag.steps)?;
    validate_schedule(&dag)?;
    Ok(dag)
}

/// Reads and parses a DAG file from disk.
pub fn load(path: &Path, opts: &LoadOptions) -> Result<Dag, DagError> {
    let yaml = std::fs::read_to_string(path)?;
    parse(&yaml, path, opts)
}

fn validate_schedule(dag: &Dag) -> Result<(), DagError> {
    for kind in [ScheduleKind::Start, ScheduleKind::Stop, ScheduleKind::Restart] {
        for expr in dag.schedule.exprs(kind) {
            croner::Cron::new(expr)
                .parse()
                .map_err(|e| DagError::InvalidSchedule(expr.clone(), e.to_string()))?;
        }
    }
    if dag.schedule.start.is_empty()
        && (!dag.schedule.stop.is_empty() || !dag.schedule.restart.is_empty())
    {
        return Err(DagError::ScheduleWithoutStart);
    }
    Ok(())
}

/// Returns the canonical location a DAG should be treated as living at, for
/// purposes of hashing into History Store / control socket paths. DAGs
/// loaded from disk use their canonicalized path; DAGs without a backing
/// file (e.g. constructed in tests) fall back to their name.
pub fn identity_path(dag: &Dag) -> PathBuf {
    if dag.location.as_os_str().is_empty() {
        PathBuf::from(&dag.name)
    } else {
        dag.location.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const SIMPLE: &str = r#"
name: simple
steps:
  - name: s1
    command: echo
    args: ["hello"]
  - name: s2
    command: echo
    args: ["world"]
    depends: ["s1"]
"#;

    #[test]
    fn loads_linear_dag() {
        let dag = parse(SIMPLE, Path::new("simple.yaml"), &LoadOptions::default()).unwrap();
        assert_eq!(dag.name, "simple");
        assert_eq!(dag.steps.len(), 2);
        assert_eq!(dag.steps[1].depends, vec!["s1".to_string()]);
    }

    #[test]
    fn metadata_only_skips_validation() {
        let yaml = "name: bad\nsteps:\n  - name: a\n    depends: [\"ghost\"]\n";
        let opts = LoadOptions { metadata_only: true };
        assert!(parse(yaml, Path::new("bad.yaml"), &opts).is_ok());
        let opts = LoadOptions { metadata_only: false };
        assert!(parse(yaml, Path::new("bad.yaml"), &opts).is_err());
    }

    #[test]
    fn rejects_invalid_cron() {
        let yaml = "name: x\nschedule: \"not a cron\"\nsteps: []\n";
        assert!(parse(yaml, Path::new("x.yaml"), &LoadOptions::default()).is_err());
    }

    #[test]
    fn rejects_stop_without_start() {
        let yaml = "name: x\nschedule:\n  stop: \"* * * * *\"\nsteps: []\n";
        assert!(parse(yaml, Path::new("x.yaml"), &LoadOptions::default()).is_err());
    }

    #[test]
    fn empty_dag_is_valid() {
        let yaml = "name: empty\nsteps: []\n";
        let dag = parse(yaml, Path::new("empty.yaml"), &LoadOptions::default()).unwrap();
        assert!(dag.steps.is_empty());
    }
}
