use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    document::HistoryDocument,
    model::{BenchResult, BenchmarkRun, CommitInfo, Person, Series, SeriesKey, ToolKind},
};

pub const BENCH_REPO: &str = "https://github.com/benchtrail/synthetic";

#[derive(Clone, Debug)]
pub struct HistoryDataset {
    pub key: SeriesKey,
    pub runs: Vec<BenchmarkRun>,
}

impl HistoryDataset {
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn lanes(&self) -> usize {
        self.runs.last().map_or(0, |run| run.benches.len())
    }

    pub fn series(&self) -> Series {
        Series::from_runs(self.key.clone(), self.runs.clone())
    }

    pub fn document(&self) -> HistoryDocument {
        let mut document = HistoryDocument::new(self.key.repo_url.clone());
        document
            .entries
            .insert(self.key.group.clone(), self.runs.clone());
        document
    }

    /// Splits off the newest run: `(baseline series, candidate run)`.
    pub fn split_last(&self) -> Option<(Series, BenchmarkRun)> {
        let (last, rest) = self.runs.split_last()?;
        Some((
            Series::from_runs(self.key.clone(), rest.to_vec()),
            last.clone(),
        ))
    }
}

#[derive(Clone, Copy, Debug)]
pub enum HistoryShape {
    /// Values wander within a few percent of a fixed level.
    Steady,
    /// Every run gets `pct` percent slower on average.
    Drifting { pct: f64 },
    /// Lane `k` only appears from run `k * every` onward.
    Sparse { every: usize },
    /// Every lane name is used twice per run.
    DuplicateNames,
}

/// Deterministic synthetic history: `runs` runs of `lanes` results each,
/// one minute apart.
pub fn generate_history(shape: HistoryShape, runs: usize, lanes: usize, seed: u64) -> HistoryDataset {
    assert!(lanes > 0, "lanes must be positive");
    let mut rng = StdRng::seed_from_u64(seed);
    let bases: Vec<f64> = (0..lanes).map(|_| rng.gen_range(1.0..1_000.0)).collect();
    let start = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
    let mut history = Vec::with_capacity(runs);
    for run_idx in 0..runs {
        let date = start + Duration::minutes(run_idx as i64);
        let mut benches = Vec::with_capacity(lanes);
        for (lane, base) in bases.iter().enumerate() {
            let noise = 1.0 + rng.gen_range(-0.03..0.03);
            let level = match shape {
                HistoryShape::Drifting { pct } => base * (1.0 + pct / 100.0).powi(run_idx as i32),
                _ => *base,
            };
            let value = level * noise;
            match shape {
                HistoryShape::Sparse { every } if run_idx < lane * every => {}
                HistoryShape::DuplicateNames => {
                    let name = lane_name(lane);
                    benches.push(BenchResult::new(name.clone(), value, "ms"));
                    benches.push(BenchResult::new(name, value * 2.0, "ms"));
                }
                _ => benches.push(BenchResult::new(lane_name(lane), value, "ms")),
            }
        }
        history.push(BenchmarkRun::new(
            synthetic_commit(run_idx, date),
            date,
            ToolKind::CustomSmallerIsBetter,
            benches,
        ));
    }
    HistoryDataset {
        key: SeriesKey::new(BENCH_REPO, ToolKind::CustomSmallerIsBetter.as_str()),
        runs: history,
    }
}

fn lane_name(lane: usize) -> String {
    format!("lane-{lane:03} - Avg Latency")
}

fn synthetic_commit(idx: usize, date: DateTime<Utc>) -> CommitInfo {
    let author = Person::new("bench-bot");
    CommitInfo {
        author: author.clone(),
        committer: author,
        distinct: None,
        id: format!("{idx:040x}"),
        message: format!("synthetic commit {idx}"),
        timestamp: date.fixed_offset(),
        tree_id: None,
        url: format!("{BENCH_REPO}/commit/{idx:040x}"),
    }
}
