use std::{fmt, result};

use serde::Serialize;

use crate::{
    document::HistoryDocument,
    errors::{BenchTrailError, ValidationError},
    model::BenchmarkRun,
};

/// Consistency counters for one history document. `details` carries one
/// human-readable line per finding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub total_groups: usize,
    pub total_runs: usize,
    pub out_of_order_runs: usize,
    pub empty_commit_ids: usize,
    pub mixed_tools: usize,
    pub invalid_names: usize,
    pub invalid_units: usize,
    pub non_finite_values: usize,
    pub details: Vec<String>,
}

impl IntegrityReport {
    pub fn merge(&mut self, other: &IntegrityReport) {
        self.total_groups = self.total_groups.max(other.total_groups);
        self.total_runs = self.total_runs.max(other.total_runs);
        self.out_of_order_runs += other.out_of_order_runs;
        self.empty_commit_ids += other.empty_commit_ids;
        self.mixed_tools += other.mixed_tools;
        self.invalid_names += other.invalid_names;
        self.invalid_units += other.invalid_units;
        self.non_finite_values += other.non_finite_values;
        self.details.extend(other.details.iter().cloned());
    }

    pub fn has_issues(&self) -> bool {
        self.out_of_order_runs > 0
            || self.empty_commit_ids > 0
            || self.mixed_tools > 0
            || self.invalid_names > 0
            || self.invalid_units > 0
            || self.non_finite_values > 0
    }
}

#[derive(Debug)]
pub struct IntegrityError {
    pub report: IntegrityReport,
    pub source: Option<BenchTrailError>,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "history integrity violations detected")
    }
}

impl std::error::Error for IntegrityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &dyn std::error::Error)
    }
}

/// Every group must be ordered by `date`, non-decreasing.
pub fn validate_ordering(document: &HistoryDocument) -> IntegrityReport {
    let mut report = base_report(document);
    for (group, runs) in &document.entries {
        for (index, pair) in runs.windows(2).enumerate() {
            if pair[1].date < pair[0].date {
                report.out_of_order_runs += 1;
                report.details.push(format!(
                    "{group}[{}]: date {} precedes {}",
                    index + 1,
                    pair[1].date.to_rfc3339(),
                    pair[0].date.to_rfc3339()
                ));
            }
        }
    }
    report
}

/// Every run in a group must come from one tool and carry a commit id.
pub fn validate_runs(document: &HistoryDocument) -> IntegrityReport {
    let mut report = base_report(document);
    for (group, runs) in &document.entries {
        let first_tool = runs.first().map(|run| run.tool);
        for (index, run) in runs.iter().enumerate() {
            if run.commit.id.is_empty() {
                report.empty_commit_ids += 1;
                report
                    .details
                    .push(format!("{group}[{index}]: commit id is empty"));
            }
            if Some(run.tool) != first_tool {
                report.mixed_tools += 1;
                report.details.push(format!(
                    "{group}[{index}]: tool {} differs from the group's first run",
                    run.tool
                ));
            }
        }
    }
    report
}

/// Stored results must satisfy the same field rules as freshly ingested ones.
pub fn validate_results(document: &HistoryDocument) -> IntegrityReport {
    let mut report = base_report(document);
    for (group, runs) in &document.entries {
        for (index, run) in runs.iter().enumerate() {
            check_results(group, index, run, &mut report);
        }
    }
    report
}

pub fn run_integrity_checks(document: &HistoryDocument) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    report.merge(&validate_ordering(document));
    report.merge(&validate_runs(document));
    report.merge(&validate_results(document));
    report
}

pub fn run_strict_integrity_checks(document: &HistoryDocument) -> result::Result<(), IntegrityError> {
    let report = run_integrity_checks(document);
    if report.has_issues() {
        Err(IntegrityError {
            report,
            source: None,
        })
    } else {
        Ok(())
    }
}

/// Rejects a run that could not be stored and read back: empty commit id,
/// empty names or units, and values that are not finite.
pub fn check_run(run: &BenchmarkRun) -> result::Result<(), ValidationError> {
    if run.commit.id.trim().is_empty() {
        return Err(ValidationError::InvalidCommit("commit id is empty".into()));
    }
    for bench in &run.benches {
        if bench.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if bench.unit.trim().is_empty() {
            return Err(ValidationError::MissingUnit {
                name: bench.name.clone(),
            });
        }
        if !bench.value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                name: bench.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_results(group: &str, index: usize, run: &BenchmarkRun, report: &mut IntegrityReport) {
    for bench in &run.benches {
        if bench.name.trim().is_empty() {
            report.invalid_names += 1;
            report
                .details
                .push(format!("{group}[{index}]: result with an empty name"));
        }
        if bench.unit.trim().is_empty() {
            report.invalid_units += 1;
            report
                .details
                .push(format!("{group}[{index}]: {} has an empty unit", bench.name));
        }
        if !bench.value.is_finite() {
            report.non_finite_values += 1;
            report
                .details
                .push(format!("{group}[{index}]: {} is not finite", bench.name));
        }
    }
}

fn base_report(document: &HistoryDocument) -> IntegrityReport {
    IntegrityReport {
        total_groups: document.entries.len(),
        total_runs: document.run_count(),
        ..IntegrityReport::default()
    }
}
