//! Comparator: classifies every lane of a new run against the most recent
//! prior occurrence of the same lane.
//!
//! Percentages are normalized so that a positive number always means the
//! metric got better, whatever its direction. Lane-level problems (changed
//! unit, zero baseline) only mark that lane; the rest of the run is still
//! evaluated.

use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{
    errors::{BenchTrailError, DataError},
    model::{BenchResult, BenchmarkRun, Direction, LaneKey, Series, ToolKind},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompareConfig {
    /// A drop larger than this many percent is a regression.
    pub regression_threshold_pct: f64,
    /// A drop larger than this fails the gate. Defaults to the regression threshold.
    pub fail_threshold_pct: Option<f64>,
    /// A gain larger than this is reported as an improvement.
    pub improvement_threshold_pct: f64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            regression_threshold_pct: 20.0,
            fail_threshold_pct: None,
            improvement_threshold_pct: 0.0,
        }
    }
}

impl CompareConfig {
    pub fn with_threshold(regression_threshold_pct: f64) -> Self {
        Self {
            regression_threshold_pct,
            ..Self::default()
        }
    }

    pub fn fail_threshold(&self) -> f64 {
        self.fail_threshold_pct
            .unwrap_or(self.regression_threshold_pct)
    }

    pub fn validate(&self) -> Result<(), BenchTrailError> {
        let checks = [
            ("regression threshold", self.regression_threshold_pct),
            ("fail threshold", self.fail_threshold()),
            ("improvement threshold", self.improvement_threshold_pct),
        ];
        for (label, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(BenchTrailError::config(format!(
                    "{label} must be a finite, non-negative percentage (got {value})"
                )));
            }
        }
        if self.fail_threshold() < self.regression_threshold_pct {
            return Err(BenchTrailError::config(format!(
                "fail threshold {} is below the regression threshold {}",
                self.fail_threshold(),
                self.regression_threshold_pct
            )));
        }
        Ok(())
    }
}

/// The prior occurrence a lane was compared against.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Baseline {
    pub value: f64,
    pub unit: String,
    pub commit_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Improved { improvement_pct: f64 },
    Stable { improvement_pct: f64 },
    RegressionDetected { improvement_pct: f64, blocking: bool },
    BaselineZero,
    UnitChanged { previous: String, current: String },
    NoBaseline,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Improved { .. } => "improved",
            Verdict::Stable { .. } => "stable",
            Verdict::RegressionDetected { blocking: true, .. } => "REGRESSION",
            Verdict::RegressionDetected { blocking: false, .. } => "regression (alert)",
            Verdict::BaselineZero => "baseline is zero",
            Verdict::UnitChanged { .. } => "unit changed",
            Verdict::NoBaseline => "new",
        }
    }

    pub fn improvement_pct(&self) -> Option<f64> {
        match self {
            Verdict::Improved { improvement_pct }
            | Verdict::Stable { improvement_pct }
            | Verdict::RegressionDetected {
                improvement_pct, ..
            } => Some(*improvement_pct),
            _ => None,
        }
    }

    pub fn is_regression(&self) -> bool {
        matches!(self, Verdict::RegressionDetected { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LaneVerdict {
    pub lane: LaneKey,
    pub unit: String,
    pub direction: Direction,
    pub current: f64,
    pub baseline: Option<Baseline>,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl LaneVerdict {
    pub fn data_error(&self) -> Option<DataError> {
        match &self.verdict {
            Verdict::UnitChanged { previous, current } => Some(DataError::UnitChanged {
                lane: self.lane.clone(),
                previous: previous.clone(),
                current: current.clone(),
            }),
            Verdict::BaselineZero => Some(DataError::BaselineZero {
                lane: self.lane.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub verdicts: Vec<LaneVerdict>,
    pub regression_threshold_pct: f64,
    pub fail_threshold_pct: f64,
}

impl ComparisonReport {
    pub fn regressions(&self) -> impl Iterator<Item = &LaneVerdict> {
        self.verdicts.iter().filter(|v| v.verdict.is_regression())
    }

    pub fn has_regression(&self) -> bool {
        self.regressions().next().is_some()
    }

    pub fn has_blocking_regression(&self) -> bool {
        self.verdicts.iter().any(|v| {
            matches!(
                v.verdict,
                Verdict::RegressionDetected { blocking: true, .. }
            )
        })
    }

    pub fn passed(&self) -> bool {
        !self.has_blocking_regression()
    }

    pub fn data_errors(&self) -> Vec<DataError> {
        self.verdicts
            .iter()
            .filter_map(LaneVerdict::data_error)
            .collect()
    }

    pub fn verdict_for(&self, lane: &LaneKey) -> Option<&LaneVerdict> {
        self.verdicts.iter().find(|v| &v.lane == lane)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Comparator {
    config: CompareConfig,
}

impl Comparator {
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Compares `run` against `baseline`, which must not already contain `run`.
    pub fn compare(&self, baseline: &Series, run: &BenchmarkRun) -> ComparisonReport {
        let lanes: Vec<(LaneKey, &BenchResult)> = run.lanes().collect();
        let found = locate_baselines(baseline, &lanes);
        let verdicts = lanes
            .into_iter()
            .map(|(lane, bench)| {
                let prior = found.get(&lane).copied();
                self.evaluate(lane, bench, run.tool, prior)
            })
            .collect();
        ComparisonReport {
            verdicts,
            regression_threshold_pct: self.config.regression_threshold_pct,
            fail_threshold_pct: self.config.fail_threshold(),
        }
    }

    fn evaluate(
        &self,
        lane: LaneKey,
        bench: &BenchResult,
        tool: ToolKind,
        prior: Option<(&BenchmarkRun, &BenchResult)>,
    ) -> LaneVerdict {
        let direction = bench.direction(tool);
        let baseline = prior.map(|(run, result)| Baseline {
            value: result.value,
            unit: result.unit.clone(),
            commit_id: run.commit.id.clone(),
            date: run.date,
        });
        let verdict = match &baseline {
            None => Verdict::NoBaseline,
            Some(base) if base.unit != bench.unit => Verdict::UnitChanged {
                previous: base.unit.clone(),
                current: bench.unit.clone(),
            },
            Some(base) => match direction.improvement_pct(base.value, bench.value) {
                None => Verdict::BaselineZero,
                Some(pct) => self.classify(pct),
            },
        };
        debug!(
            lane = %lane,
            direction = direction.as_str(),
            current = bench.value,
            verdict = verdict.label(),
            "compared lane"
        );
        LaneVerdict {
            lane,
            unit: bench.unit.clone(),
            direction,
            current: bench.value,
            baseline,
            verdict,
        }
    }

    fn classify(&self, improvement_pct: f64) -> Verdict {
        if improvement_pct < -self.config.regression_threshold_pct {
            Verdict::RegressionDetected {
                improvement_pct,
                blocking: improvement_pct < -self.config.fail_threshold(),
            }
        } else if improvement_pct > self.config.improvement_threshold_pct {
            Verdict::Improved { improvement_pct }
        } else {
            Verdict::Stable { improvement_pct }
        }
    }
}

/// Walks the series newest-first until every wanted lane has a prior occurrence.
fn locate_baselines<'a>(
    series: &'a Series,
    lanes: &[(LaneKey, &BenchResult)],
) -> AHashMap<LaneKey, (&'a BenchmarkRun, &'a BenchResult)> {
    let mut pending: AHashSet<LaneKey> = lanes.iter().map(|(lane, _)| lane.clone()).collect();
    let mut found = AHashMap::with_capacity(pending.len());
    for prior in series.runs().iter().rev() {
        if pending.is_empty() {
            break;
        }
        for (lane, bench) in prior.lanes() {
            if pending.remove(&lane) {
                found.insert(lane, (prior, bench));
            }
        }
    }
    found
}
