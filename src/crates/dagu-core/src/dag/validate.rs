//! Structural validation shared by the DAG loader and [`crate::graph::Graph`]
//! construction: duplicate step names, unknown dependency references, and
//! cycles in the dependency graph.

use super::error::DagError;
use super::types::Step;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates step names and dependency edges, returning the step-name ->
/// index map on success.
pub fn validate_steps(steps: &[Step]) -> Result<HashMap<String, usize>, DagError> {
    let mut index = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if index.insert(step.name.clone(), i).is_some() {
            return Err(DagError::DuplicateStep(step.name.clone()));
        }
    }
    for step in steps {
        for dep in &step.depends {
            if !index.contains_key(dep) {
                return Err(DagError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    detect_cycle(steps, &index)?;
    Ok(index)
}

fn detect_cycle(steps: &[Step], index: &HashMap<String, usize>) -> Result<(), DagError> {
    let mut colors = vec![Color::White; steps.len()];

    fn visit(
        i: usize,
        steps: &[Step],
        index: &HashMap<String, usize>,
        colors: &mut Vec<Color>,
    ) -> Result<(), DagError> {
        colors[i] = Color::Gray;
        for dep in &steps[i].depends {
            let j = index[dep];
            match colors[j] {
                Color::White => visit(j, steps, index, colors)?,
                Color::Gray => {
                    return Err(DagError::CycleDetected {
                        from: steps[i].name.clone(),
                        to: steps[j].name.clone(),
                    })
                }
                Color::Black => {}
            }
        }
        colors[i] = Color::Black;
        Ok(())
    }

    for i in 0..steps.len() {
        if colors[i] == Color::White {
            visit(i, steps, index, &mut colors)?;
        }
    }
    Ok(())
}

/// The set of transitive ancestors (parents, grandparents, ...) per step
/// name, used to scope output-variable visibility to descendants.
pub fn ancestor_sets(steps: &[Step]) -> HashMap<String, HashSet<String>> {
    let by_name: HashMap<&str, &Step> = steps.iter().map(|s| (s.name.as_str(), s)).collect();

    fn collect<'a>(name: &str, by_name: &HashMap<&'a str, &'a Step>, out: &mut HashSet<String>) {
        if let Some(step) = by_name.get(name) {
            for dep in &step.depends {
                if out.insert(dep.clone()) {
                    collect(dep, by_name, out);
                }
            }
        }
    }

    steps
        .iter()
        .map(|s| {
            let mut set = HashSet::new();
            collect(&s.name, &by_name, &mut set);
            (s.name.clone(), set)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::types::Step;

    fn step(name: &str, depends: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            command: Some("true".to_string()),
            args: vec![],
            script: None,
            dir: None,
            shell: None,
            env: Default::default(),
            depends: depends.iter().map(|s| s.to_string()).collect(),
            preconditions: vec![],
            retry_policy: None,
            repeat_policy: None,
            continue_on: Default::default(),
            signal_on_stop: None,
            output: None,
            run: None,
            params: None,
            executor: Default::default(),
            timeout: None,
        }
    }

    #[test]
    fn detects_duplicate_step_names() {
        let steps = vec![step("a", &[]), step("a", &[])];
        assert!(matches!(
            validate_steps(&steps),
            Err(DagError::DuplicateStep(_))
        ));
    }

    #[test]
    fn detects_unknown_dependency() {
        let steps = vec![step("a", &["ghost"])];
        assert!(matches!(
            validate_steps(&steps),
            Err(DagError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn detects_cycle() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert!(matches!(
            validate_steps(&steps),
            Err(DagError::CycleDetected { .. })
        ));
    }

    #[test]
    fn accepts_linear_dag() {
        let steps = vec![step("a", &[]), step("b", &["a"])];
        assert!(validate_steps(&steps).is_ok());
        let ancestors = ancestor_sets(&steps);
        assert!(ancestors["b"].contains("a"));
        assert!(ancestors["a"].is_empty());
    }
}
