//! Ingest parser: turns raw tool output plus commit metadata into a validated
//! [`BenchmarkRun`].
//!
//! Bad individual results are dropped and reported as [`Diagnostic`]s; only
//! run-level problems (unknown tool, unreadable document, invalid commit)
//! fail the whole parse. The parser never touches a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::{debug, warn};

use crate::{
    errors::{BenchTrailError, ValidationError, serialize_display},
    model::{BenchResult, BenchmarkRun, CommitInfo, Direction, ToolKind},
};

/// A result that was dropped during ingestion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Position in the raw input (array index, or line index for text output).
    pub index: usize,
    pub name: Option<String>,
    #[serde(rename = "reason", serialize_with = "serialize_display")]
    pub error: ValidationError,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRun {
    pub run: BenchmarkRun,
    pub diagnostics: Vec<Diagnostic>,
}

/// Values stay unparsed so that a number outside the `f64` range only
/// affects its own result.
#[derive(Deserialize)]
struct RawBench {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<Box<RawValue>>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    extra: Option<String>,
    #[serde(default)]
    direction: Option<String>,
}

pub fn parse_run(
    raw: &str,
    tool: &str,
    commit: CommitInfo,
    date: DateTime<Utc>,
) -> Result<ParsedRun, BenchTrailError> {
    let tool: ToolKind = tool.parse()?;
    validate_commit(&commit)?;
    let (benches, diagnostics) = match tool {
        ToolKind::CustomBiggerIsBetter | ToolKind::CustomSmallerIsBetter => {
            parse_custom_json(raw)?
        }
        ToolKind::Cargo => parse_cargo_output(raw),
    };
    for diagnostic in &diagnostics {
        warn!(
            index = diagnostic.index,
            name = diagnostic.name.as_deref().unwrap_or(""),
            "dropping result: {}",
            diagnostic.error
        );
    }
    debug!(
        tool = tool.as_str(),
        accepted = benches.len(),
        dropped = diagnostics.len(),
        "parsed run for {}",
        commit.id
    );
    Ok(ParsedRun {
        run: BenchmarkRun::new(commit, date, tool, benches),
        diagnostics,
    })
}

pub fn parse_commit(json: &str) -> Result<CommitInfo, BenchTrailError> {
    let commit: CommitInfo = serde_json::from_str(json)
        .map_err(|e| BenchTrailError::malformed(format!("commit descriptor: {e}")))?;
    validate_commit(&commit)?;
    Ok(commit)
}

/// Accepts epoch milliseconds or an RFC 3339 timestamp.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, BenchTrailError> {
    let input = input.trim();
    if let Ok(millis) = input.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| BenchTrailError::malformed(format!("date {millis} out of range")));
    }
    DateTime::parse_from_rfc3339(input)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| BenchTrailError::malformed(format!("date {input:?}: {e}")))
}

fn validate_commit(commit: &CommitInfo) -> Result<(), ValidationError> {
    if commit.id.trim().is_empty() {
        return Err(ValidationError::InvalidCommit("commit id is empty".into()));
    }
    Ok(())
}

#[derive(Deserialize)]
struct NameOnly {
    #[serde(default)]
    name: Option<String>,
}

fn parse_custom_json(raw: &str) -> Result<(Vec<BenchResult>, Vec<Diagnostic>), BenchTrailError> {
    let items: Vec<Box<RawValue>> = serde_json::from_str(raw)
        .map_err(|e| BenchTrailError::malformed(format!("bench output is not a JSON array: {e}")))?;
    let mut benches = Vec::with_capacity(items.len());
    let mut diagnostics = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let name = serde_json::from_str::<NameOnly>(item.get())
            .ok()
            .and_then(|named| named.name);
        let parsed = serde_json::from_str::<RawBench>(item.get())
            .map_err(|e| ValidationError::MalformedResult(e.to_string()))
            .and_then(validate_raw);
        match parsed {
            Ok(bench) => benches.push(bench),
            Err(error) => diagnostics.push(Diagnostic { index, name, error }),
        }
    }
    Ok((benches, diagnostics))
}

fn validate_raw(raw: RawBench) -> Result<BenchResult, ValidationError> {
    let name = raw.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    let value = match raw.value {
        Some(value) => numeric_value(&name, &value)?,
        None => {
            return Err(ValidationError::MalformedResult(format!(
                "{name}: missing value"
            )));
        }
    };
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { name });
    }
    let unit = raw.unit.unwrap_or_default();
    if unit.trim().is_empty() {
        return Err(ValidationError::MissingUnit { name });
    }
    let direction = match raw.direction.as_deref() {
        Some(explicit) => Some(explicit.parse::<Direction>()?),
        None => raw.extra.as_deref().and_then(direction_hint),
    };
    Ok(BenchResult {
        name,
        value,
        unit,
        range: raw.range,
        extra: raw.extra,
        direction,
    })
}

/// A JSON number or a numeric string. Numbers beyond the `f64` range
/// become infinite and are rejected later as non-finite.
fn numeric_value(name: &str, value: &RawValue) -> Result<f64, ValidationError> {
    let text = value.get().trim();
    let not_numeric =
        || ValidationError::MalformedResult(format!("{name}: value {text} is not numeric"));
    if text.starts_with('"') {
        let inner: String = serde_json::from_str(text).map_err(|_| not_numeric())?;
        return inner.trim().parse::<f64>().map_err(|_| not_numeric());
    }
    if text.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
        return text.parse::<f64>().map_err(|_| not_numeric());
    }
    Err(not_numeric())
}

/// Looks for a direction token inside the free-form `extra` string.
fn direction_hint(extra: &str) -> Option<Direction> {
    let lowered = extra.to_ascii_lowercase();
    match (
        lowered.contains("biggerisbetter"),
        lowered.contains("smallerisbetter"),
    ) {
        (true, false) => Some(Direction::BiggerIsBetter),
        (false, true) => Some(Direction::SmallerIsBetter),
        _ => None,
    }
}

/// Parses `cargo bench` (libtest) output:
/// `test parse::small ... bench:       1,234 ns/iter (+/- 56)`.
fn parse_cargo_output(raw: &str) -> (Vec<BenchResult>, Vec<Diagnostic>) {
    let mut benches = Vec::new();
    let mut diagnostics = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let Some(rest) = line.trim().strip_prefix("test ") else {
            continue;
        };
        let Some((name, measurement)) = rest.split_once(" ... bench:") else {
            continue;
        };
        let name = name.trim();
        match parse_libtest_measurement(name, measurement) {
            Ok(bench) => benches.push(bench),
            Err(error) => diagnostics.push(Diagnostic {
                index,
                name: Some(name.to_string()),
                error,
            }),
        }
    }
    (benches, diagnostics)
}

fn parse_libtest_measurement(name: &str, measurement: &str) -> Result<BenchResult, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    let measurement = measurement.trim();
    let (number, rest) = measurement
        .split_once(char::is_whitespace)
        .unwrap_or((measurement, ""));
    let value: f64 = number.replace(',', "").parse().map_err(|_| {
        ValidationError::MalformedResult(format!("{name}: value {number:?} is not numeric"))
    })?;
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue {
            name: name.to_string(),
        });
    }
    let (unit, range) = match rest.split_once('(') {
        Some((unit, range)) => (unit.trim(), Some(range)),
        None => (rest.trim(), None),
    };
    if unit.is_empty() {
        return Err(ValidationError::MissingUnit {
            name: name.to_string(),
        });
    }
    let range = range
        .map(|r| r.trim().trim_end_matches(')').replace("+/-", "±").replace(',', ""))
        .filter(|r| !r.is_empty());
    Ok(BenchResult {
        name: name.to_string(),
        value,
        unit: unit.to_string(),
        range,
        extra: None,
        direction: None,
    })
}
