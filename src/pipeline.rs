use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::{
    compare::ComparisonReport,
    errors::BenchTrailError,
    ingest::{self, Diagnostic},
    model::{CommitInfo, SeriesKey},
    store::HistoryStore,
};

/// One CI run waiting to be ingested.
#[derive(Clone, Debug)]
pub struct IngestRequest {
    pub repo_url: String,
    /// Tool-group key; `None` uses the tool name.
    pub group: Option<String>,
    pub tool: String,
    pub commit: CommitInfo,
    /// Raw tool output.
    pub raw: String,
    pub date: DateTime<Utc>,
}

impl IngestRequest {
    pub fn group_key(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.tool)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngestReport {
    pub key: SeriesKey,
    pub commit_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    /// Position of the stored run; `None` for a dry run.
    pub index: Option<usize>,
    pub accepted: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub comparison: ComparisonReport,
    pub dry_run: bool,
}

impl IngestReport {
    pub fn passed(&self) -> bool {
        self.comparison.passed()
    }
}

/// Parser, store and comparator wired together for one ingestion.
pub struct Ingestor<'a> {
    store: &'a HistoryStore,
    dry_run: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a HistoryStore) -> Self {
        Self {
            store,
            dry_run: false,
        }
    }

    /// Compare only; nothing is appended or published.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn ingest(&self, request: IngestRequest) -> Result<IngestReport, BenchTrailError> {
        let key = SeriesKey::new(request.repo_url.clone(), request.group_key());
        let parsed = ingest::parse_run(&request.raw, &request.tool, request.commit, request.date)?;
        let commit_id = parsed.run.commit.id.clone();
        let date = parsed.run.date;
        let accepted = parsed.run.benches.len();

        let (index, comparison) = if self.dry_run {
            let comparison = self.store.compare(&key.repo_url, &key.group, &parsed.run)?;
            (None, comparison)
        } else {
            let outcome = self.store.append(&key.repo_url, &key.group, parsed.run)?;
            (Some(outcome.index), outcome.comparison)
        };

        info!(
            key = %key,
            commit = %commit_id,
            accepted,
            dropped = parsed.diagnostics.len(),
            dry_run = self.dry_run,
            passed = comparison.passed(),
            "ingested run"
        );
        Ok(IngestReport {
            key,
            commit_id,
            date,
            index,
            accepted,
            diagnostics: parsed.diagnostics,
            comparison,
            dry_run: self.dry_run,
        })
    }
}
