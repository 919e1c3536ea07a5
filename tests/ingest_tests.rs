use benchtrail::{
    BenchTrailError, Direction, ParseError, ToolKind, ValidationError,
    ingest::{parse_commit, parse_run},
};
use chrono::{TimeZone, Utc};

const COMMIT: &str = include_str!("fixtures/commit.json");
const MIXED: &str = include_str!("fixtures/bench_mixed.json");
const CLEAN: &str = include_str!("fixtures/bench_clean.json");
const CARGO: &str = include_str!("fixtures/cargo_output.txt");

fn date() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 0).unwrap()
}

#[test]
fn commit_descriptor_parses_github_shape() {
    let commit = parse_commit(COMMIT).unwrap();
    assert_eq!(commit.id, "7f3c2a91d4e5b6a7c8d9e0f1a2b3c4d5e6f7a8b9");
    assert_eq!(commit.author.username.as_deref(), Some("developer"));
    assert_eq!(commit.distinct, Some(true));
    assert_eq!(commit.timestamp.offset().local_minus_utc(), 3600);
}

#[test]
fn commit_without_id_is_rejected() {
    let json = COMMIT.replace("7f3c2a91d4e5b6a7c8d9e0f1a2b3c4d5e6f7a8b9", "");
    let err = parse_commit(&json).unwrap_err();
    assert!(matches!(
        err,
        BenchTrailError::Validation(ValidationError::InvalidCommit(_))
    ));
}

#[test]
fn unknown_tool_fails_the_whole_run() {
    let commit = parse_commit(COMMIT).unwrap();
    let err = parse_run(CLEAN, "pytest", commit, date()).unwrap_err();
    assert!(matches!(
        err,
        BenchTrailError::Parse(ParseError::UnknownTool(ref tool)) if tool == "pytest"
    ));
}

#[test]
fn non_array_input_is_malformed() {
    let commit = parse_commit(COMMIT).unwrap();
    let err = parse_run("{\"name\": 1}", "customSmallerIsBetter", commit, date()).unwrap_err();
    assert!(matches!(err, BenchTrailError::Parse(ParseError::Malformed(_))));
}

#[test]
fn bad_results_are_dropped_individually() {
    let commit = parse_commit(COMMIT).unwrap();
    let parsed = parse_run(MIXED, "customSmallerIsBetter", commit, date()).unwrap();

    let names: Vec<&str> = parsed.run.benches.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["blocks - Avg Latency", "stringly", "Peers"]);
    assert_eq!(parsed.run.benches[1].value, 12.5);

    let reasons: Vec<(usize, &ValidationError)> = parsed
        .diagnostics
        .iter()
        .map(|d| (d.index, &d.error))
        .collect();
    assert_eq!(reasons.len(), 5);
    assert_eq!(
        reasons[0],
        (
            1,
            &ValidationError::NonFiniteValue {
                name: "broken".into()
            }
        )
    );
    assert_eq!(
        reasons[1],
        (
            2,
            &ValidationError::MissingUnit {
                name: "unitless".into()
            }
        )
    );
    assert_eq!(reasons[2], (3, &ValidationError::MissingName));
    assert_eq!(
        reasons[3],
        (5, &ValidationError::InvalidDirection("sideways".into()))
    );
    assert_eq!(reasons[4].0, 6);
    assert!(matches!(reasons[4].1, ValidationError::MalformedResult(_)));
}

#[test]
fn out_of_range_number_drops_only_that_result() {
    let commit = parse_commit(COMMIT).unwrap();
    let raw = r#"[
        { "name": "ok", "value": 1.0, "unit": "ms" },
        { "name": "huge", "value": 1e400, "unit": "ms" },
        { "name": "tiny", "value": -1e400, "unit": "ms" },
        { "name": "flag", "value": true, "unit": "ms" }
    ]"#;
    let parsed = parse_run(raw, "customSmallerIsBetter", commit, date()).unwrap();
    assert_eq!(parsed.run.benches.len(), 1);
    assert_eq!(parsed.run.benches[0].name, "ok");
    assert_eq!(parsed.diagnostics.len(), 3);
    assert_eq!(
        parsed.diagnostics[0].error,
        ValidationError::NonFiniteValue {
            name: "huge".into()
        }
    );
    assert_eq!(parsed.diagnostics[0].name.as_deref(), Some("huge"));
    assert_eq!(
        parsed.diagnostics[1].error,
        ValidationError::NonFiniteValue {
            name: "tiny".into()
        }
    );
    assert!(matches!(
        parsed.diagnostics[2].error,
        ValidationError::MalformedResult(_)
    ));
}

#[test]
fn direction_overrides_are_resolved_at_ingest() {
    let commit = parse_commit(COMMIT).unwrap();
    let parsed = parse_run(MIXED, "customSmallerIsBetter", commit.clone(), date()).unwrap();
    let peers = parsed.run.benches.iter().find(|b| b.name == "Peers").unwrap();
    assert_eq!(peers.direction, Some(Direction::BiggerIsBetter));
    let latency = &parsed.run.benches[0];
    assert_eq!(latency.direction, None);
    assert_eq!(latency.direction(parsed.run.tool), Direction::SmallerIsBetter);

    let clean = parse_run(CLEAN, "customSmallerIsBetter", commit, date()).unwrap();
    let throughput = clean.run.benches.iter().find(|b| b.name == "Throughput").unwrap();
    assert_eq!(throughput.direction, Some(Direction::BiggerIsBetter));
}

#[test]
fn duplicate_names_are_kept_in_order() {
    let commit = parse_commit(COMMIT).unwrap();
    let parsed = parse_run(CLEAN, "customSmallerIsBetter", commit, date()).unwrap();
    assert!(parsed.diagnostics.is_empty());
    let lanes: Vec<String> = parsed.run.lanes().map(|(lane, _)| lane.to_string()).collect();
    assert_eq!(
        lanes,
        vec![
            "blocks - Avg Latency",
            "tx - Avg Latency",
            "blocks - Avg Latency [#2]",
            "Throughput"
        ]
    );
}

#[test]
fn cargo_bench_output_is_parsed() {
    let commit = parse_commit(COMMIT).unwrap();
    let parsed = parse_run(CARGO, "cargo", commit, date()).unwrap();
    assert_eq!(parsed.run.tool, ToolKind::Cargo);
    assert!(parsed.diagnostics.is_empty());
    assert_eq!(parsed.run.benches.len(), 3);
    let decode = &parsed.run.benches[2];
    assert_eq!(decode.name, "codec::decode_header");
    assert_eq!(decode.value, 18905.0);
    assert_eq!(decode.unit, "ns/iter");
    assert_eq!(decode.range.as_deref(), Some("± 1021"));
    assert_eq!(decode.direction(ToolKind::Cargo), Direction::SmallerIsBetter);
}

#[test]
fn cargo_output_without_bench_lines_is_an_empty_run() {
    let commit = parse_commit(COMMIT).unwrap();
    let parsed = parse_run("running 0 tests\n", "cargo", commit, date()).unwrap();
    assert!(parsed.run.benches.is_empty());
    assert!(parsed.diagnostics.is_empty());
}
