//! Parsing of the duration shorthand used throughout DAG YAML: plain integers
//! are whole seconds, suffixed strings ("500ms", "2m", "1h") use the unit
//! named by their suffix.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("invalid duration {0:?}")]
pub struct DurationParseError(pub String);

pub fn parse_duration_secs(value: i64) -> Duration {
    Duration::from_secs(value.max(0) as u64)
}

/// Parses `"30"`, `"500ms"`, `"2m"`, `"1h"` into a [`Duration`].
pub fn parse_duration_str(value: &str) -> Result<Duration, DurationParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DurationParseError(value.to_string()));
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let split_at = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| DurationParseError(value.to_string()))?;
    let (num, unit) = value.split_at(split_at);
    let num: f64 = num
        .parse()
        .map_err(|_| DurationParseError(value.to_string()))?;
    let millis = match unit {
        "ms" => num,
        "s" => num * 1_000.0,
        "m" => num * 60_000.0,
        "h" => num * 3_600_000.0,
        _ => return Err(DurationParseError(value.to_string())),
    };
    Ok(Duration::from_millis(millis.max(0.0) as u64))
}
