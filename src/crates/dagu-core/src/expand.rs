//! Variable expansion applied to a step's command/args/env before it is
//! handed to an executor: environment variable references (`${NAME}` /
//! `$NAME`), ancestor output-variable references (including dotted JSON-path
//! descent, `${VAR.a.b[0]}`), and backtick command substitution.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Command;
use std::sync::OnceLock;

fn var_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\[\]]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

fn backtick_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]*)`").unwrap())
}

/// The values visible to a step while expanding its command: its own
/// process environment plus every ancestor's output variables, keyed by
/// variable name.
#[derive(Debug, Default, Clone)]
pub struct ExpandContext {
    pub env: HashMap<String, String>,
    pub outputs: HashMap<String, Value>,
}

pub fn expand(template: &str, ctx: &ExpandContext) -> String {
    let with_vars = expand_vars(template, ctx);
    expand_command_substitution(&with_vars)
}

fn expand_vars(template: &str, ctx: &ExpandContext) -> String {
    var_ref_re()
        .replace_all(template, |caps: &regex::Captures| {
            let path = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            resolve_path(path, ctx).unwrap_or_default()
        })
        .into_owned()
}

fn resolve_path(path: &str, ctx: &ExpandContext) -> Option<String> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    if let Some(value) = ctx.outputs.get(root) {
        let mut current = value.clone();
        for seg in segments {
            current = descend(&current, seg)?;
        }
        return Some(match current {
            Value::String(s) => s,
            other => other.to_string(),
        });
    }
    ctx.env.get(root).cloned()
}

/// Resolves one path segment, which may itself carry a trailing `[idx]`.
fn descend(value: &Value, segment: &str) -> Option<Value> {
    let (field, index) = match segment.find('[') {
        Some(pos) => {
            let field = &segment[..pos];
            let idx_str = segment[pos + 1..].trim_end_matches(']');
            (field, idx_str.parse::<usize>().ok())
        }
        None => (segment, None),
    };
    let mut current = if field.is_empty() {
        value.clone()
    } else {
        value.get(field)?.clone()
    };
    if let Some(idx) = index {
        current = current.get(idx)?.clone();
    }
    Some(current)
}

fn expand_command_substitution(template: &str) -> String {
    backtick_re()
        .replace_all(template, |caps: &regex::Captures| {
            let cmd = &caps[1];
            run_and_capture(cmd).unwrap_or_default()
        })
        .into_owned()
}

fn run_and_capture(cmd: &str) -> Option<String> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let output = Command::new(shell).arg("-c").arg(cmd).output().ok()?;
    let mut s = String::from_utf8_lossy(&output.stdout).into_owned();
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_plain_env_var() {
        let mut ctx = ExpandContext::default();
        ctx.env.insert("NAME".to_string(), "world".to_string());
        assert_eq!(expand("hello ${NAME}", &ctx), "hello world");
        assert_eq!(expand("hello $NAME", &ctx), "hello world");
    }

    #[test]
    fn expands_dotted_output_path() {
        let mut ctx = ExpandContext::default();
        ctx.outputs.insert(
            "R".to_string(),
            serde_json::json!({"a": {"b": [10, 20, 30]}}),
        );
        assert_eq!(expand("${R.a.b[1]}", &ctx), "20");
    }

    #[test]
    fn expands_backtick_command_substitution() {
        let ctx = ExpandContext::default();
        assert_eq!(expand("value=`echo -n hi`", &ctx), "value=hi");
    }

    #[test]
    fn unresolved_var_expands_to_empty_string() {
        let ctx = ExpandContext::default();
        assert_eq!(expand("${MISSING}", &ctx), "");
    }
}
