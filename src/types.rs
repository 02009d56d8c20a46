use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Which batch backend the jobs of a plan are handed to.
///
/// - `Local`: child processes on this machine.
/// - `Condor`: one DAGMan submission per task.
/// - `Torque`: one `qsub` per job, chained with `afterok` dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Local,
    Condor,
    Torque,
}

impl Default for DriverKind {
    fn default() -> Self {
        DriverKind::Local
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(DriverKind::Local),
            "condor" => Ok(DriverKind::Condor),
            "torque" => Ok(DriverKind::Torque),
            other => Err(format!(
                "invalid driver: {other} (expected \"local\", \"condor\" or \"torque\")"
            )),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverKind::Local => "local",
            DriverKind::Condor => "condor",
            DriverKind::Torque => "torque",
        };
        f.write_str(s)
    }
}

/// Memory request as written in the plan: either a bare number of megabytes
/// or a free-form string the batch system understands (e.g. `"2 GB"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MemoryRequest {
    Megabytes(u64),
    Text(String),
}

impl Default for MemoryRequest {
    fn default() -> Self {
        MemoryRequest::Text("1 GB".to_string())
    }
}

impl fmt::Display for MemoryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRequest::Megabytes(mb) => write!(f, "{mb}"),
            MemoryRequest::Text(s) => f.write_str(s),
        }
    }
}

/// A duration as written in the plan: integer seconds or a string such as
/// `"90s"`, `"15m"` or `"4h"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    Seconds(u64),
    Text(String),
}

impl DurationSpec {
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            DurationSpec::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationSpec::Text(s) => parse_duration(s),
        }
    }
}

impl From<Duration> for DurationSpec {
    fn from(d: Duration) -> Self {
        DurationSpec::Seconds(d.as_secs())
    }
}

/// Convert the plan's signed concurrency bound into an optional limit.
///
/// Negative values mean "unbounded"; zero is rejected by validation.
pub fn concurrency_limit(raw: i64) -> Option<usize> {
    if raw < 0 { None } else { Some(raw as usize) }
}

/// Parse a duration string with a unit suffix (`ms`, `s`, `m`, `h`).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_durations() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("3 h"), Ok(Duration::from_secs(3 * 3600)));
        assert!(parse_duration("12").is_err());
        assert!(parse_duration("2d").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let err = parse_duration("99999999999999999h").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("18446744073709551615m").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn negative_concurrency_is_unbounded() {
        assert_eq!(concurrency_limit(-1), None);
        assert_eq!(concurrency_limit(4), Some(4));
    }

    #[test]
    fn memory_renders_verbatim() {
        assert_eq!(MemoryRequest::Megabytes(12288).to_string(), "12288");
        assert_eq!(MemoryRequest::Text("2 GB".into()).to_string(), "2 GB");
    }
}
