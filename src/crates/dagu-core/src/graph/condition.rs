//! Shared grammar for preconditions and repeat conditions: a `condition`
//! expanded against the run's env/output context, optionally compared
//! against an `expected` value. `expected` values prefixed `re:` match as a
//! regex; otherwise the match is a literal substring.

use crate::dag::{ContinueOn, Precondition};
use crate::expand::{expand, ExpandContext};
use crate::node::{Node, NodeStatus};
use regex::Regex;
use std::process::Command;

/// A precondition with no `expected` is grammar case (b): `condition` is run
/// as a sub-command and the precondition holds iff it exits zero, not a
/// truthiness check on its expanded text.
pub fn evaluate_precondition(pre: &Precondition, ctx: &ExpandContext) -> bool {
    let actual = expand(&pre.condition, ctx);
    match &pre.expected {
        Some(expected) => matches_value(expected, &actual),
        None => run_condition(&actual),
    }
}

pub fn evaluate_preconditions(preconditions: &[Precondition], ctx: &ExpandContext) -> bool {
    preconditions.iter().all(|p| evaluate_precondition(p, ctx))
}

fn run_condition(cmd: &str) -> bool {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    Command::new(shell)
        .arg("-c")
        .arg(cmd)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn matches_value(expected: &str, actual: &str) -> bool {
    if let Some(pattern) = expected.strip_prefix("re:") {
        Regex::new(pattern)
            .map(|re| re.is_match(actual))
            .unwrap_or(false)
    } else {
        actual.contains(expected)
    }
}

/// Whether `child`'s dependency on `parent` is cleared, per
/// `child_continue_on`. A parent must be terminal before this is called.
pub fn dependency_clears(parent: &Node, child_continue_on: &ContinueOn) -> bool {
    debug_assert!(parent.is_terminal());
    match parent.status {
        NodeStatus::Success => true,
        NodeStatus::Failed => {
            child_continue_on.failure
                || parent
                    .exit_code
                    .map(|code| child_continue_on.exit_codes.contains(&code))
                    .unwrap_or(false)
                || parent
                    .stdout
                    .as_deref()
                    .map(|out| output_matches(out, &child_continue_on.output))
                    .unwrap_or(false)
        }
        NodeStatus::Skipped => child_continue_on.skipped,
        NodeStatus::Cancelled => false,
        NodeStatus::NotStarted | NodeStatus::Running => false,
    }
}

fn output_matches(stdout: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| matches_value(p, stdout))
}

/// Whether a repeat should fire another iteration, given the policy's mode.
/// `holds` is the evaluated condition/expected result (or `true` if the
/// policy carries no condition, per the "absence means repeat until limit"
/// rule).
pub fn repeat_should_continue(mode: crate::dag::RepeatMode, holds: bool) -> bool {
    use crate::dag::RepeatMode::*;
    match mode {
        While => holds,
        Until => !holds,
        Fixed => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::RepeatMode;

    fn node_with(status: NodeStatus, exit_code: Option<i32>) -> Node {
        let mut n = Node::new("p");
        n.status = status;
        n.exit_code = exit_code;
        n
    }

    #[test]
    fn success_always_clears() {
        let parent = node_with(NodeStatus::Success, Some(0));
        assert!(dependency_clears(&parent, &ContinueOn::default()));
    }

    #[test]
    fn failure_without_continue_on_does_not_clear() {
        let parent = node_with(NodeStatus::Failed, Some(1));
        assert!(!dependency_clears(&parent, &ContinueOn::default()));
    }

    #[test]
    fn failure_with_continue_on_failure_clears() {
        let parent = node_with(NodeStatus::Failed, Some(1));
        let c = ContinueOn {
            failure: true,
            ..Default::default()
        };
        assert!(dependency_clears(&parent, &c));
    }

    #[test]
    fn failure_with_matching_exit_code_clears() {
        let parent = node_with(NodeStatus::Failed, Some(42));
        let c = ContinueOn {
            exit_codes: vec![42],
            ..Default::default()
        };
        assert!(dependency_clears(&parent, &c));
    }

    #[test]
    fn skipped_requires_continue_on_skipped() {
        let parent = node_with(NodeStatus::Skipped, None);
        assert!(!dependency_clears(&parent, &ContinueOn::default()));
        let c = ContinueOn {
            skipped: true,
            ..Default::default()
        };
        assert!(dependency_clears(&parent, &c));
    }

    #[test]
    fn regex_expected_matches_pattern() {
        let ctx = ExpandContext::default();
        let pre = Precondition {
            condition: "abc123".to_string(),
            expected: Some("re:^abc\\d+$".to_string()),
        };
        assert!(evaluate_precondition(&pre, &ctx));
    }

    #[test]
    fn repeat_modes() {
        assert!(repeat_should_continue(RepeatMode::While, true));
        assert!(!repeat_should_continue(RepeatMode::While, false));
        assert!(!repeat_should_continue(RepeatMode::Until, true));
        assert!(repeat_should_continue(RepeatMode::Until, false));
        assert!(repeat_should_continue(RepeatMode::Fixed, false));
    }
}
