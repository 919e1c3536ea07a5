use std::{path::PathBuf, time::Duration};

use tracing::debug;

use crate::{
    backend::{HistoryBackend, JsonFileBackend, MemoryBackend},
    compare::CompareConfig,
    errors::BenchTrailError,
    publish::DirectoryPublisher,
    query::DEFAULT_WINDOW,
    retry::RetryPolicy,
    store::HistoryStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Json,
    Sqlite,
    Memory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Memory => "memory",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub kind: BackendKind,
    /// Directory or file for `Json`, database file for `Sqlite`; unused for `Memory`.
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BenchTrailConfig {
    pub storage: StorageConfig,
    pub compare: CompareConfig,
    pub retry: RetryPolicy,
    pub summary_window: usize,
    pub deadline: Option<Duration>,
    /// Directory that receives a `data.js` copy after every append.
    pub publish_dir: Option<PathBuf>,
}

impl Default for BenchTrailConfig {
    fn default() -> Self {
        Self::json("benchtrail-data")
    }
}

impl BenchTrailConfig {
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self::with_storage(BackendKind::Json, path.into())
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::with_storage(BackendKind::Sqlite, path.into())
    }

    pub fn memory() -> Self {
        Self::with_storage(BackendKind::Memory, PathBuf::new())
    }

    fn with_storage(kind: BackendKind, path: PathBuf) -> Self {
        Self {
            storage: StorageConfig { kind, path },
            compare: CompareConfig::default(),
            retry: RetryPolicy::default(),
            summary_window: DEFAULT_WINDOW,
            deadline: None,
            publish_dir: None,
        }
    }

    pub fn validate(&self) -> Result<(), BenchTrailError> {
        if self.summary_window == 0 {
            return Err(BenchTrailError::config("summary window must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(BenchTrailError::config("retry attempts must be at least 1"));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(BenchTrailError::config(
                "retry base delay exceeds the maximum delay",
            ));
        }
        if self.deadline.is_some_and(|deadline| deadline.is_zero()) {
            return Err(BenchTrailError::config("deadline must be positive"));
        }
        if self.storage.kind != BackendKind::Memory && self.storage.path.as_os_str().is_empty() {
            return Err(BenchTrailError::config(format!(
                "{} storage needs a path",
                self.storage.kind.as_str()
            )));
        }
        self.compare.validate()
    }

    pub fn backend(&self) -> Result<Box<dyn HistoryBackend>, BenchTrailError> {
        match self.storage.kind {
            BackendKind::Json => Ok(Box::new(JsonFileBackend::open(&self.storage.path))),
            BackendKind::Memory => Ok(Box::new(MemoryBackend::new())),
            #[cfg(feature = "sqlite-backend")]
            BackendKind::Sqlite => Ok(Box::new(crate::backend::SqliteBackend::open(
                &self.storage.path,
            )?)),
            #[cfg(not(feature = "sqlite-backend"))]
            BackendKind::Sqlite => Err(BenchTrailError::config(
                "built without the sqlite-backend feature",
            )),
        }
    }
}

/// Validates `config` and opens a store over the configured backend.
pub fn open_store(config: &BenchTrailConfig) -> Result<HistoryStore, BenchTrailError> {
    config.validate()?;
    let backend = config.backend()?;
    debug!(
        backend = backend.name(),
        path = %config.storage.path.display(),
        "opening history store"
    );
    let mut builder = HistoryStore::builder_boxed(backend)
        .compare(config.compare.clone())
        .retry(config.retry.clone());
    if let Some(deadline) = config.deadline {
        builder = builder.deadline(deadline);
    }
    if let Some(dir) = &config.publish_dir {
        builder = builder.publisher(DirectoryPublisher::new(dir));
    }
    Ok(builder.build())
}
