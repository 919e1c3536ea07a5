use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    errors::BenchTrailError,
    model::{BenchmarkRun, CommitInfo, LaneKey, Series},
    store::HistoryStore,
};

pub const DEFAULT_WINDOW: usize = 10;

/// One observation of a lane.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub commit: CommitInfo,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    pub ordinal: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LaneSummary {
    pub unit: String,
    pub latest_value: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub latest_date: DateTime<Utc>,
    pub window_mean: f64,
    pub window_std_dev: f64,
    /// Number of runs that contributed to the window. Runs recorded before
    /// the latest unit change are not counted.
    pub samples: usize,
}

/// Read-only projections over a store. Nothing here writes.
pub struct QueryService<'a> {
    store: &'a HistoryStore,
    window: usize,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a HistoryStore) -> Self {
        Self {
            store,
            window: DEFAULT_WINDOW,
        }
    }

    /// Number of most recent runs containing a lane that feed its summary.
    pub fn window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Every lane named `name`, in run order. Runs without the lane
    /// contribute nothing.
    pub fn get_series(
        &self,
        repo_url: &str,
        group: &str,
        name: &str,
    ) -> Result<Vec<SeriesPoint>, BenchTrailError> {
        let series = self.store.read(repo_url, group)?;
        let mut points = Vec::new();
        for run in series.runs() {
            for (lane, bench) in run.lanes() {
                if lane.name == name {
                    points.push(SeriesPoint {
                        commit: run.commit.clone(),
                        date: run.date,
                        value: bench.value,
                        unit: bench.unit.clone(),
                        ordinal: lane.ordinal,
                    });
                }
            }
        }
        Ok(points)
    }

    pub fn get_lane(
        &self,
        repo_url: &str,
        group: &str,
        lane: &LaneKey,
    ) -> Result<Vec<SeriesPoint>, BenchTrailError> {
        let mut points = self.get_series(repo_url, group, &lane.name)?;
        points.retain(|point| point.ordinal == lane.ordinal);
        Ok(points)
    }

    pub fn get_latest_summary(
        &self,
        repo_url: &str,
        group: &str,
    ) -> Result<BTreeMap<LaneKey, LaneSummary>, BenchTrailError> {
        let series = self.store.read(repo_url, group)?;
        Ok(summarize(&series, self.window))
    }

    pub fn latest_run(
        &self,
        repo_url: &str,
        group: &str,
    ) -> Result<Option<BenchmarkRun>, BenchTrailError> {
        let series = self.store.read(repo_url, group)?;
        Ok(series.last().cloned())
    }
}

struct Window {
    unit: String,
    latest_value: f64,
    latest_date: DateTime<Utc>,
    values: Vec<f64>,
    /// Set once an older run reports the lane in another unit.
    closed: bool,
}

/// Walks the series newest-first, collecting up to `window` values per lane.
/// A lane's window ends at the first older run that used a different unit.
pub fn summarize(series: &Series, window: usize) -> BTreeMap<LaneKey, LaneSummary> {
    let window = window.max(1);
    let mut lanes: BTreeMap<LaneKey, Window> = BTreeMap::new();
    for run in series.runs().iter().rev() {
        for (lane, bench) in run.lanes() {
            let entry = lanes.entry(lane).or_insert_with(|| Window {
                unit: bench.unit.clone(),
                latest_value: bench.value,
                latest_date: run.date,
                values: Vec::with_capacity(window),
                closed: false,
            });
            if bench.unit != entry.unit {
                entry.closed = true;
            }
            if !entry.closed && entry.values.len() < window {
                entry.values.push(bench.value);
            }
        }
    }
    lanes
        .into_iter()
        .map(|(lane, window)| {
            let (mean, std_dev) = mean_and_std_dev(&window.values);
            let summary = LaneSummary {
                unit: window.unit,
                latest_value: window.latest_value,
                latest_date: window.latest_date,
                window_mean: mean,
                window_std_dev: std_dev,
                samples: window.values.len(),
            };
            (lane, summary)
        })
        .collect()
}

/// Sample standard deviation; zero for fewer than two values.
fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}
