use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::LaneKey;

/// Error type for benchtrail operations.
#[derive(Debug, Error)]
pub enum BenchTrailError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("store i/o error: {0}")]
    StoreIo(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl BenchTrailError {
    pub fn store_io<T: Into<String>>(msg: T) -> Self {
        BenchTrailError::StoreIo(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        BenchTrailError::Config(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        BenchTrailError::NotFound(msg.into())
    }

    pub fn malformed<T: Into<String>>(msg: T) -> Self {
        BenchTrailError::Parse(ParseError::Malformed(msg.into()))
    }

    pub fn corrupt_history<T: Into<String>>(msg: T) -> Self {
        BenchTrailError::Parse(ParseError::CorruptHistory(msg.into()))
    }

    /// Only storage and publishing failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BenchTrailError::StoreIo(_))
    }
}

/// Run-level input problems. Always fatal to the run being ingested.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unknown tool {0:?}")]
    UnknownTool(String),
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("corrupt history document: {0}")]
    CorruptHistory(String),
}

/// Field-level problems. Per-metric variants drop one result; `OutOfOrder`
/// and `InvalidCommit` reject the whole run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{name}: value is not finite")]
    NonFiniteValue { name: String },
    #[error("{name}: unit is empty")]
    MissingUnit { name: String },
    #[error("result has an empty name")]
    MissingName,
    #[error("malformed result: {0}")]
    MalformedResult(String),
    #[error("unrecognized direction {0:?}")]
    InvalidDirection(String),
    #[error("invalid commit: {0}")]
    InvalidCommit(String),
    #[error("run date {attempted} is older than the last stored date {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
}

/// Lane-level comparison problems. They mark a single lane incomparable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("{lane}: unit changed from {previous:?} to {current:?}")]
    UnitChanged {
        lane: LaneKey,
        previous: String,
        current: String,
    },
    #[error("{lane}: baseline value is zero")]
    BaselineZero { lane: LaneKey },
}

pub(crate) fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: serde::Serializer,
{
    serializer.collect_str(value)
}
