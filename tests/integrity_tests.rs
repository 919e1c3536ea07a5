use benchtrail::{
    BenchResult, HistoryDocument, ToolKind,
    integrity::{
        run_integrity_checks, run_strict_integrity_checks, validate_ordering, validate_results,
        validate_runs,
    },
};

const DATA_JS: &str = include_str!("fixtures/data.js");

fn fixture() -> HistoryDocument {
    DATA_JS.parse().unwrap()
}

#[test]
fn clean_fixture_has_no_issues() {
    let report = run_integrity_checks(&fixture());
    assert_eq!(report.total_groups, 2);
    assert_eq!(report.total_runs, 3);
    assert!(!report.has_issues());
    assert!(report.details.is_empty());
    assert!(run_strict_integrity_checks(&fixture()).is_ok());
}

#[test]
fn reordered_runs_are_flagged() {
    let mut document = fixture();
    document
        .entries
        .get_mut("customSmallerIsBetter")
        .unwrap()
        .reverse();
    let report = validate_ordering(&document);
    assert_eq!(report.out_of_order_runs, 1);
    assert!(report.details[0].starts_with("customSmallerIsBetter[1]"));
}

#[test]
fn mixed_tools_and_empty_commits_are_flagged() {
    let mut document = fixture();
    let runs = document.entries.get_mut("customSmallerIsBetter").unwrap();
    runs[1].tool = ToolKind::Cargo;
    runs[0].commit.id.clear();
    let report = validate_runs(&document);
    assert_eq!(report.mixed_tools, 1);
    assert_eq!(report.empty_commit_ids, 1);
}

#[test]
fn invalid_results_are_counted() {
    let mut document = fixture();
    let runs = document.entries.get_mut("customBiggerIsBetter").unwrap();
    runs[0].benches.push(BenchResult::new("", 1.0, "ms"));
    runs[0].benches.push(BenchResult::new("unitless", 1.0, " "));
    runs[0].benches.push(BenchResult::new("nan", f64::NAN, "ms"));
    let report = validate_results(&document);
    assert_eq!(report.invalid_names, 1);
    assert_eq!(report.invalid_units, 1);
    assert_eq!(report.non_finite_values, 1);

    let err = run_strict_integrity_checks(&document).unwrap_err();
    assert_eq!(err.report.details.len(), 3);
    assert_eq!(err.to_string(), "history integrity violations detected");
}
