use assert_cmd::Command;
use benchtrail::HistoryDocument;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const REPO: &str = "https://github.com/acme/chain-indexer";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn benchtrail() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_benchtrail"));
    cmd.env_remove("BENCHTRAIL_LOG")
        .env_remove("BENCHTRAIL_DB")
        .env_remove("BENCHTRAIL_BACKEND")
        .env_remove("BENCHTRAIL_REPO");
    cmd
}

/// A working copy of the fixture history as a single `data.js` file.
fn seeded_history(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("data.js");
    std::fs::copy(fixture("data.js"), &path).unwrap();
    path
}

fn ingest_as(db: &Path, bench: &str, tool: &str, date: &str) -> Command {
    let mut cmd = benchtrail();
    cmd.args(["--db", db.to_str().unwrap(), "ingest", "--repo", REPO])
        .args(["--tool", tool])
        .arg("--commit-file")
        .arg(fixture("commit.json"))
        .arg("--bench-file")
        .arg(fixture(bench))
        .args(["--date", date, "--retries", "1"]);
    cmd
}

fn ingest(db: &Path, bench: &str) -> Command {
    ingest_as(db, bench, "customSmallerIsBetter", "2024-03-05T10:20:00Z")
}

#[test]
fn help_succeeds() {
    benchtrail().arg("--help").assert().success();
}

#[test]
fn usage_errors_exit_2() {
    benchtrail().arg("ingest").assert().code(2);
}

#[test]
fn clean_ingest_exits_0_and_appends() {
    let dir = TempDir::new().unwrap();
    let db = seeded_history(&dir);
    let output = ingest(&db, "bench_clean.json").assert().code(0).get_output().clone();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("PASS"));
    let document: HistoryDocument = std::fs::read_to_string(&db).unwrap().parse().unwrap();
    assert_eq!(document.entries["customSmallerIsBetter"].len(), 3);
}

#[test]
fn blocking_regression_exits_1() {
    let dir = TempDir::new().unwrap();
    let db = seeded_history(&dir);
    ingest(&db, "bench_regression.json").assert().code(1);
}

#[test]
fn alert_only_regression_exits_0() {
    let dir = TempDir::new().unwrap();
    let db = seeded_history(&dir);
    ingest(&db, "bench_regression.json")
        .args(["--fail-threshold", "75"])
        .assert()
        .code(0);
}

#[test]
fn unknown_tool_exits_2() {
    let dir = TempDir::new().unwrap();
    let db = seeded_history(&dir);
    ingest_as(&db, "bench_clean.json", "pytest", "2024-03-05T10:20:00Z")
        .assert()
        .code(2);
    let document: HistoryDocument = std::fs::read_to_string(&db).unwrap().parse().unwrap();
    assert_eq!(document.entries["customSmallerIsBetter"].len(), 2);
}

#[test]
fn out_of_order_date_exits_2() {
    let dir = TempDir::new().unwrap();
    let db = seeded_history(&dir);
    ingest_as(&db, "bench_clean.json", "customSmallerIsBetter", "2024-01-01T00:00:00Z")
        .assert()
        .code(2);
}

#[test]
fn unwritable_store_exits_3() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "plain file").unwrap();
    ingest(&blocker.join("history"), "bench_clean.json")
        .assert()
        .code(3);
}

#[test]
fn json_report_is_machine_readable() {
    let dir = TempDir::new().unwrap();
    let db = seeded_history(&dir);
    let output = ingest(&db, "bench_clean.json")
        .args(["--format", "json", "--dry-run"])
        .assert()
        .code(0)
        .get_output()
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["accepted"], 4);
    assert_eq!(report["comparison"]["verdicts"][0]["verdict"], "improved");
}

#[test]
fn publish_dir_receives_data_js() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("history");
    let pages = dir.path().join("pages");
    ingest(&db, "bench_clean.json")
        .arg("--publish-dir")
        .arg(&pages)
        .assert()
        .code(0);
    let published = std::fs::read_to_string(pages.join("data.js")).unwrap();
    assert!(published.starts_with("window.BENCHMARK_DATA = "));
}

#[test]
fn series_summary_export_and_verify() {
    let dir = TempDir::new().unwrap();
    let db = seeded_history(&dir);
    let db_arg = db.to_str().unwrap();

    let series = benchtrail()
        .args(["--db", db_arg, "series", "--repo", REPO])
        .args(["--group", "customSmallerIsBetter", "--name", "blocks - Avg Latency"])
        .args(["--ordinal", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let series = String::from_utf8(series).unwrap();
    assert_eq!(series.lines().count(), 2);
    assert!(series.lines().all(|line| line.contains("\t#1\t")));

    let summary = benchtrail()
        .args(["--db", db_arg, "summary", "--repo", REPO])
        .args(["--group", "customSmallerIsBetter", "--window", "5"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(summary).unwrap().lines().count(), 4);

    let exported = dir.path().join("export.json");
    benchtrail()
        .args(["--db", db_arg, "export", "--repo", REPO, "--output"])
        .arg(&exported)
        .assert()
        .success();
    let document: HistoryDocument = std::fs::read_to_string(&exported).unwrap().parse().unwrap();
    assert_eq!(document.run_count(), 3);

    benchtrail()
        .args(["--db", db_arg, "verify", "--repo", REPO])
        .assert()
        .success();
}

#[test]
fn sqlite_backend_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("history.db");
    ingest(&db, "bench_clean.json")
        .args(["--backend", "sqlite"])
        .assert()
        .code(0);
    benchtrail()
        .args(["--backend", "sqlite", "--db", db.to_str().unwrap()])
        .args(["verify", "--repo", REPO])
        .assert()
        .success();
}

#[test]
fn verify_missing_history_exits_3() {
    let dir = TempDir::new().unwrap();
    benchtrail()
        .args(["--db", dir.path().join("empty").to_str().unwrap()])
        .args(["verify", "--repo", REPO])
        .assert()
        .code(3);
}
