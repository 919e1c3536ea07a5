//! Persisted wire format: one JSON document per repository.
//!
//! ```text
//! { "lastUpdate": <epoch-ms>, "repoUrl": "<url>", "entries": { "<group>": [run, ...] } }
//! ```
//!
//! The same document may be wrapped in the `window.BENCHMARK_DATA = ...`
//! script envelope used by dashboard pages; both forms are accepted on read.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::BenchTrailError,
    model::{BenchmarkRun, Series, SeriesKey, truncate_millis},
};

pub const DATA_JS_PREFIX: &str = "window.BENCHMARK_DATA = ";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDocument {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
    pub repo_url: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<BenchmarkRun>>,
}

impl HistoryDocument {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            last_update: truncate_millis(Utc::now()),
            repo_url: repo_url.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn series(&self, group: &str) -> Series {
        let key = SeriesKey::new(self.repo_url.clone(), group);
        match self.entries.get(group) {
            Some(runs) => Series::from_runs(key, runs.clone()),
            None => Series::empty(key),
        }
    }

    pub fn run_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn to_json_string(&self) -> Result<String, BenchTrailError> {
        serde_json::to_string_pretty(self).map_err(|e| BenchTrailError::store_io(e.to_string()))
    }

    pub fn to_data_js(&self) -> Result<String, BenchTrailError> {
        Ok(format!("{DATA_JS_PREFIX}{}\n", self.to_json_string()?))
    }
}

impl FromStr for HistoryDocument {
    type Err = BenchTrailError;

    /// Parses either plain JSON or the `window.BENCHMARK_DATA = {...};` envelope.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let body = match trimmed.strip_prefix("window.BENCHMARK_DATA") {
            Some(rest) => rest
                .trim_start()
                .strip_prefix('=')
                .ok_or_else(|| BenchTrailError::corrupt_history("missing '=' after envelope"))?
                .trim()
                .trim_end_matches(';'),
            None => trimmed,
        };
        serde_json::from_str(body).map_err(|e| BenchTrailError::corrupt_history(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_and_plain_forms_parse_alike() {
        let plain = r#"{"lastUpdate":1700000000000,"repoUrl":"https://github.com/o/r","entries":{}}"#;
        let wrapped = format!("{DATA_JS_PREFIX}{plain};\n");
        let a: HistoryDocument = plain.parse().unwrap();
        let b: HistoryDocument = wrapped.parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.last_update.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn missing_group_reads_as_empty_series() {
        let doc = HistoryDocument::new("https://github.com/o/r");
        let series = doc.series("Benchmark");
        assert!(series.is_empty());
        assert_eq!(series.key().group, "Benchmark");
    }
}
