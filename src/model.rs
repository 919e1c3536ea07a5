//! Core value types: commits, benchmark results, runs, series and lanes.
//!
//! Everything here is immutable once built. A [`BenchmarkRun`] keeps its
//! results in the order the tool produced them; that order is what gives two
//! results with the same name their own [`LaneKey`].

use std::{fmt, str::FromStr};

use ahash::AHashMap;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ParseError, ValidationError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Person {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            email: None,
            name: name.into(),
            username: None,
        }
    }
}

/// VCS metadata for the revision a run was measured on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub author: Person,
    pub committer: Person,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<bool>,
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    pub url: String,
}

/// Which way a metric improves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    BiggerIsBetter,
    SmallerIsBetter,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::BiggerIsBetter => "biggerIsBetter",
            Direction::SmallerIsBetter => "smallerIsBetter",
        }
    }

    /// Percent change where a positive result always means "got better".
    ///
    /// Returns `None` when the baseline is zero.
    pub fn improvement_pct(self, old: f64, new: f64) -> Option<f64> {
        if old == 0.0 {
            return None;
        }
        let delta = match self {
            Direction::BiggerIsBetter => new - old,
            Direction::SmallerIsBetter => old - new,
        };
        Some(delta / old.abs() * 100.0)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "bigger" | "biggerisbetter" | "higher" | "higherisbetter" => {
                Ok(Direction::BiggerIsBetter)
            }
            "smaller" | "smallerisbetter" | "lower" | "lowerisbetter" => {
                Ok(Direction::SmallerIsBetter)
            }
            _ => Err(ValidationError::InvalidDirection(s.to_string())),
        }
    }
}

/// Aggregation tool that produced a run; fixes the default direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "customBiggerIsBetter")]
    CustomBiggerIsBetter,
    #[serde(rename = "customSmallerIsBetter")]
    CustomSmallerIsBetter,
    #[serde(rename = "cargo")]
    Cargo,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::CustomBiggerIsBetter,
        ToolKind::CustomSmallerIsBetter,
        ToolKind::Cargo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::CustomBiggerIsBetter => "customBiggerIsBetter",
            ToolKind::CustomSmallerIsBetter => "customSmallerIsBetter",
            ToolKind::Cargo => "cargo",
        }
    }

    pub fn default_direction(self) -> Direction {
        match self {
            ToolKind::CustomBiggerIsBetter => Direction::BiggerIsBetter,
            ToolKind::CustomSmallerIsBetter | ToolKind::Cargo => Direction::SmallerIsBetter,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ParseError::UnknownTool(s.to_string()))
    }
}

/// One named measurement inside a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    /// Explicit per-metric override; `None` follows the tool default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl BenchResult {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            range: None,
            extra: None,
            direction: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn direction(&self, tool: ToolKind) -> Direction {
        self.direction.unwrap_or_else(|| tool.default_direction())
    }
}

/// Identifies one lane: a metric name plus its occurrence index within a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneKey {
    pub name: String,
    pub ordinal: usize,
}

impl LaneKey {
    pub fn new(name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            ordinal,
        }
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ordinal == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} [#{}]", self.name, self.ordinal + 1)
        }
    }
}

/// Result set of one CI run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub commit: CommitInfo,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub tool: ToolKind,
    pub benches: Vec<BenchResult>,
}

impl BenchmarkRun {
    /// Builds a run; `date` is truncated to the millisecond precision of the wire format.
    pub fn new(
        commit: CommitInfo,
        date: DateTime<Utc>,
        tool: ToolKind,
        benches: Vec<BenchResult>,
    ) -> Self {
        Self {
            commit,
            date: truncate_millis(date),
            tool,
            benches,
        }
    }

    /// Yields every result together with its lane key, in run order.
    pub fn lanes(&self) -> impl Iterator<Item = (LaneKey, &BenchResult)> + '_ {
        let mut seen: AHashMap<&str, usize> = AHashMap::new();
        self.benches.iter().map(move |bench| {
            let slot = seen.entry(bench.name.as_str()).or_insert(0);
            let ordinal = *slot;
            *slot += 1;
            (LaneKey::new(bench.name.clone(), ordinal), bench)
        })
    }

    pub fn lane(&self, key: &LaneKey) -> Option<&BenchResult> {
        self.benches
            .iter()
            .filter(|bench| bench.name == key.name)
            .nth(key.ordinal)
    }
}

pub fn truncate_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(date.timestamp_millis()).unwrap_or(date)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub repo_url: String,
    pub group: String,
}

impl SeriesKey {
    pub fn new(repo_url: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo_url, self.group)
    }
}

/// Ordered, append-only history of one `(repository, group)` key.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    key: SeriesKey,
    runs: Vec<BenchmarkRun>,
}

impl Series {
    pub fn empty(key: SeriesKey) -> Self {
        Self {
            key,
            runs: Vec::new(),
        }
    }

    pub fn from_runs(key: SeriesKey, runs: Vec<BenchmarkRun>) -> Self {
        Self { key, runs }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn runs(&self) -> &[BenchmarkRun] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn last(&self) -> Option<&BenchmarkRun> {
        self.runs.last()
    }

    pub fn last_date(&self) -> Option<DateTime<Utc>> {
        self.runs.last().map(|run| run.date)
    }

    /// Returns the successor series with `run` at the end. `self` is untouched.
    pub fn appended(&self, run: BenchmarkRun) -> Series {
        let mut runs = Vec::with_capacity(self.runs.len() + 1);
        runs.extend_from_slice(&self.runs);
        runs.push(run);
        Series {
            key: self.key.clone(),
            runs,
        }
    }
}
