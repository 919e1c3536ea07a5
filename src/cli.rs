//! Command line surface of the `benchtrail` binary.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    backend::json_file::{is_script, write_atomically},
    config::{BackendKind, BenchTrailConfig, StorageConfig, open_store},
    errors::BenchTrailError,
    ingest,
    integrity,
    model::LaneKey,
    pipeline::{IngestRequest, Ingestor},
    query::QueryService,
    report,
};

pub const EXIT_OK: u8 = 0;
pub const EXIT_REGRESSION: u8 = 1;
pub const EXIT_INVALID: u8 = 2;
pub const EXIT_STORE_IO: u8 = 3;

/// Continuous-benchmark history store and regression gate.
#[derive(Parser, Debug)]
#[command(name = "benchtrail", author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Storage backend.
    #[arg(long, value_enum, default_value_t = BackendArg::Json, env = "BENCHTRAIL_BACKEND", global = true)]
    pub backend: BackendArg,
    /// History location, or `memory`. A `.json`/`.js` path holds a single repository.
    #[arg(long, default_value = "benchtrail-data", env = "BENCHTRAIL_DB", global = true)]
    pub db: String,
    /// Log filter used when BENCHTRAIL_LOG is unset.
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Json,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Markdown,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse one run, append it and compare it against its baseline.
    Ingest(IngestArgs),
    /// Print every observation of one metric.
    Series {
        #[arg(long, env = "BENCHTRAIL_REPO")]
        repo: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        name: String,
        /// Restrict to one occurrence of a repeated name (0-based).
        #[arg(long)]
        ordinal: Option<usize>,
    },
    /// Print latest value and windowed statistics per lane.
    Summary {
        #[arg(long, env = "BENCHTRAIL_REPO")]
        repo: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        window: Option<usize>,
    },
    /// Write the stored history document.
    Export {
        #[arg(long, env = "BENCHTRAIL_REPO")]
        repo: String,
        /// Output file; `.js` selects the `window.BENCHMARK_DATA` envelope. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check a stored history document for consistency problems.
    Verify {
        #[arg(long, env = "BENCHTRAIL_REPO")]
        repo: String,
    },
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    #[arg(long, env = "BENCHTRAIL_REPO")]
    pub repo: String,
    /// customBiggerIsBetter, customSmallerIsBetter or cargo.
    #[arg(long, env = "BENCHTRAIL_TOOL")]
    pub tool: String,
    /// Tool-group key; defaults to the tool name.
    #[arg(long)]
    pub group: Option<String>,
    #[arg(long)]
    pub commit_file: PathBuf,
    #[arg(long)]
    pub bench_file: PathBuf,
    /// RFC 3339 or epoch milliseconds; defaults to now.
    #[arg(long)]
    pub date: Option<String>,
    /// Regression threshold in percent.
    #[arg(long, env = "BENCHTRAIL_THRESHOLD")]
    pub threshold: Option<f64>,
    /// Fail threshold in percent; defaults to the regression threshold.
    #[arg(long, env = "BENCHTRAIL_FAIL_THRESHOLD")]
    pub fail_threshold: Option<f64>,
    /// Directory that receives `data.js` after the append.
    #[arg(long, env = "BENCHTRAIL_PUBLISH_DIR")]
    pub publish_dir: Option<PathBuf>,
    /// Attempts for persist and publish.
    #[arg(long, env = "BENCHTRAIL_RETRIES")]
    pub retries: Option<u32>,
    #[arg(long, env = "BENCHTRAIL_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
    /// Compare without storing.
    #[arg(long)]
    pub dry_run: bool,
}

impl GlobalArgs {
    pub fn config(&self) -> BenchTrailConfig {
        let storage = if self.db == "memory" {
            StorageConfig {
                kind: BackendKind::Memory,
                path: PathBuf::new(),
            }
        } else {
            let kind = match self.backend {
                BackendArg::Json => BackendKind::Json,
                BackendArg::Sqlite => BackendKind::Sqlite,
            };
            StorageConfig {
                kind,
                path: PathBuf::from(&self.db),
            }
        };
        BenchTrailConfig {
            storage,
            ..BenchTrailConfig::memory()
        }
    }
}

/// Maps an error to the process exit code.
pub fn exit_code(err: &BenchTrailError) -> u8 {
    match err {
        BenchTrailError::Parse(_) | BenchTrailError::Validation(_) | BenchTrailError::Config(_) => {
            EXIT_INVALID
        }
        BenchTrailError::StoreIo(_) | BenchTrailError::NotFound(_) => EXIT_STORE_IO,
    }
}

/// Runs one command and returns the exit code for a successful run.
pub fn run(cli: Cli) -> Result<u8, BenchTrailError> {
    let mut config = cli.global.config();
    match cli.command {
        Command::Ingest(args) => run_ingest(config, args),
        Command::Series {
            repo,
            group,
            name,
            ordinal,
        } => {
            let store = open_store(&config)?;
            let query = QueryService::new(&store);
            let points = match ordinal {
                Some(ordinal) => query.get_lane(&repo, &group, &LaneKey::new(name, ordinal))?,
                None => query.get_series(&repo, &group, &name)?,
            };
            let mut out = std::io::stdout().lock();
            for point in points {
                writeln!(
                    out,
                    "{}\t{}\t#{}\t{}\t{}",
                    point.date.to_rfc3339(),
                    point.commit.id,
                    point.ordinal,
                    point.value,
                    point.unit
                )
                .map_err(stdout_error)?;
            }
            Ok(EXIT_OK)
        }
        Command::Summary {
            repo,
            group,
            window,
        } => {
            if let Some(window) = window {
                config.summary_window = window;
            }
            let store = open_store(&config)?;
            let summary = QueryService::new(&store)
                .window(config.summary_window)
                .get_latest_summary(&repo, &group)?;
            let mut out = std::io::stdout().lock();
            for (lane, stats) in summary {
                writeln!(
                    out,
                    "{lane}\tlatest={} {}\tmean={:.4}\tstddev={:.4}\tn={}",
                    stats.latest_value,
                    stats.unit,
                    stats.window_mean,
                    stats.window_std_dev,
                    stats.samples
                )
                .map_err(stdout_error)?;
            }
            Ok(EXIT_OK)
        }
        Command::Export { repo, output } => {
            let store = open_store(&config)?;
            let document = store.document(&repo)?;
            if document.entries.is_empty() {
                return Err(BenchTrailError::not_found(format!("no history for {repo}")));
            }
            match output {
                Some(path) => {
                    let body = if is_script(&path) {
                        document.to_data_js()?
                    } else {
                        document.to_json_string()?
                    };
                    write_atomically(&path, body.as_bytes())?;
                }
                None => {
                    let body = document.to_json_string()?;
                    writeln!(std::io::stdout().lock(), "{body}").map_err(stdout_error)?;
                }
            }
            Ok(EXIT_OK)
        }
        Command::Verify { repo } => {
            let store = open_store(&config)?;
            let document = store
                .backend()
                .load(&repo)?
                .ok_or_else(|| BenchTrailError::not_found(format!("no history for {repo}")))?;
            let report = integrity::run_integrity_checks(&document);
            let mut out = std::io::stdout().lock();
            writeln!(
                out,
                "groups={} runs={} issues={}",
                report.total_groups,
                report.total_runs,
                report.details.len()
            )
            .map_err(stdout_error)?;
            for detail in &report.details {
                writeln!(out, "  {detail}").map_err(stdout_error)?;
            }
            Ok(if report.has_issues() {
                EXIT_INVALID
            } else {
                EXIT_OK
            })
        }
    }
}

fn run_ingest(mut config: BenchTrailConfig, args: IngestArgs) -> Result<u8, BenchTrailError> {
    if let Some(threshold) = args.threshold {
        config.compare.regression_threshold_pct = threshold;
    }
    config.compare.fail_threshold_pct = args.fail_threshold;
    if let Some(retries) = args.retries {
        config.retry.max_attempts = retries;
    }
    config.deadline = args.timeout_secs.map(Duration::from_secs);
    config.publish_dir = args.publish_dir.clone();

    let commit = ingest::parse_commit(&read_input(&args.commit_file)?)?;
    let raw = read_input(&args.bench_file)?;
    let date = match &args.date {
        Some(date) => ingest::parse_date(date)?,
        None => Utc::now(),
    };

    let store = open_store(&config)?;
    let report = Ingestor::new(&store)
        .dry_run(args.dry_run)
        .ingest(IngestRequest {
            repo_url: args.repo,
            group: args.group,
            tool: args.tool,
            commit,
            raw,
            date,
        })?;

    let rendered = match args.format {
        ReportFormat::Text => report::render_text(&report),
        ReportFormat::Markdown => report::render_markdown(&report),
        ReportFormat::Json => serde_json::to_string_pretty(&report)
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?,
    };
    writeln!(std::io::stdout().lock(), "{}", rendered.trim_end()).map_err(stdout_error)?;
    Ok(if report.passed() {
        EXIT_OK
    } else {
        EXIT_REGRESSION
    })
}

fn read_input(path: &Path) -> Result<String, BenchTrailError> {
    fs::read_to_string(path)
        .map_err(|e| BenchTrailError::config(format!("{}: {e}", path.display())))
}

fn stdout_error(err: std::io::Error) -> BenchTrailError {
    BenchTrailError::store_io(format!("stdout: {err}"))
}
