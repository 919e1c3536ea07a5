//! Human-readable rendering of an [`IngestReport`]: skipped metrics first,
//! then one row per lane, then the gate verdict.

use std::fmt;

use crate::{
    compare::{LaneVerdict, Verdict},
    pipeline::IngestReport,
};

pub fn render_text(report: &IngestReport) -> String {
    Text(report).to_string()
}

pub fn render_markdown(report: &IngestReport) -> String {
    Markdown(report).to_string()
}

struct Text<'a>(&'a IngestReport);

impl fmt::Display for Text<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        write!(f, "{} @ {}", report.key, short_id(&report.commit_id))?;
        match report.index {
            Some(index) => writeln!(f, " (run #{index}, {} results)", report.accepted)?,
            None => writeln!(f, " (dry run, {} results)", report.accepted)?,
        }
        if !report.diagnostics.is_empty() {
            writeln!(f, "skipped:")?;
            for diagnostic in &report.diagnostics {
                writeln!(f, "  [{}] {}", diagnostic.index, diagnostic.error)?;
            }
        }
        for error in report.comparison.data_errors() {
            writeln!(f, "incomparable: {error}")?;
        }
        for lane in &report.comparison.verdicts {
            writeln!(
                f,
                "  {:<40} {:>14} -> {:>14} {:>9}  {}",
                lane.lane.to_string(),
                baseline_cell(lane),
                format!("{} {}", format_value(lane.current), lane.unit),
                change_cell(&lane.verdict),
                lane.verdict.label()
            )?;
        }
        writeln!(f, "{}", gate_line(report))
    }
}

struct Markdown<'a>(&'a IngestReport);

impl fmt::Display for Markdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "# Benchmark result for `{}`", short_id(&report.commit_id))?;
        writeln!(f)?;
        writeln!(f, "Series: `{}`", report.key)?;
        writeln!(f)?;
        if !report.diagnostics.is_empty() {
            writeln!(f, "## Skipped metrics")?;
            writeln!(f)?;
            for diagnostic in &report.diagnostics {
                let name = diagnostic.name.as_deref().unwrap_or("(unnamed)");
                writeln!(f, "- `{name}` (input #{}): {}", diagnostic.index, diagnostic.error)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "| Benchmark | Baseline | Current | Change | Verdict |")?;
        writeln!(f, "|-----------|----------|---------|--------|---------|")?;
        for lane in &report.comparison.verdicts {
            writeln!(
                f,
                "| `{}` | {} | {} {} | {} | {} |",
                lane.lane,
                baseline_cell(lane),
                format_value(lane.current),
                lane.unit,
                change_cell(&lane.verdict),
                lane.verdict.label()
            )?;
        }
        writeln!(f)?;
        writeln!(f, "**{}**", gate_line(report))
    }
}

fn gate_line(report: &IngestReport) -> String {
    let regressions = report.comparison.regressions().count();
    if report.passed() {
        format!(
            "PASS: {regressions} regression(s) beyond {}%, none beyond the {}% fail threshold",
            report.comparison.regression_threshold_pct, report.comparison.fail_threshold_pct
        )
    } else {
        format!(
            "FAIL: {regressions} regression(s), at least one beyond the {}% fail threshold",
            report.comparison.fail_threshold_pct
        )
    }
}

fn baseline_cell(lane: &LaneVerdict) -> String {
    match &lane.baseline {
        Some(baseline) => format!("{} {}", format_value(baseline.value), baseline.unit),
        None => "-".to_string(),
    }
}

fn change_cell(verdict: &Verdict) -> String {
    match verdict.improvement_pct() {
        Some(pct) => format!("{pct:+.2}%"),
        None => "n/a".to_string(),
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn short_id(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}
