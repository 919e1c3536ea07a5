//! Continuous-benchmark history store and regression comparator.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod backend;
pub mod bench_utils;
pub mod cli;
pub mod compare;
pub mod config;
pub mod document;
pub mod errors;
pub mod fault_injection;
pub mod ingest;
pub mod integrity;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod query;
pub mod report;
pub mod retry;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use crate::backend::{HistoryBackend, JsonFileBackend, MemoryBackend};
#[cfg(feature = "sqlite-backend")]
pub use crate::backend::SqliteBackend;
pub use crate::compare::{Comparator, CompareConfig, ComparisonReport, LaneVerdict, Verdict};
pub use crate::config::{BenchTrailConfig, open_store};
pub use crate::document::HistoryDocument;
pub use crate::errors::{BenchTrailError, DataError, ParseError, ValidationError};
pub use crate::model::{
    BenchResult, BenchmarkRun, CommitInfo, Direction, LaneKey, Person, Series, SeriesKey, ToolKind,
};
pub use crate::pipeline::{IngestReport, IngestRequest, Ingestor};
pub use crate::query::{LaneSummary, QueryService, SeriesPoint};
pub use crate::store::{AppendOutcome, HistoryStore};
