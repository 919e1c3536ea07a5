//! Storage backends for history documents. The store only ever loads and
//! persists whole [`HistoryDocument`]s; each backend decides how that maps
//! onto its medium. The `sqlite-backend` Cargo feature (enabled by default)
//! keeps [`SqliteBackend`] compiled in.

pub(crate) mod json_file;
mod memory;
#[cfg(feature = "sqlite-backend")]
mod sqlite;

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "sqlite-backend")]
pub use sqlite::SqliteBackend;

use tracing::info;

use crate::{document::HistoryDocument, errors::BenchTrailError};

pub trait HistoryBackend: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns `None` for a repository that has never been persisted.
    fn load(&self, repo_url: &str) -> Result<Option<HistoryDocument>, BenchTrailError>;
    /// Replaces the stored document for `document.repo_url`. Must be atomic.
    fn persist(&self, document: &HistoryDocument) -> Result<(), BenchTrailError>;
    /// Removes everything stored for `repo_url`; a no-op when nothing is.
    fn discard(&self, repo_url: &str) -> Result<(), BenchTrailError>;
    fn repositories(&self) -> Result<Vec<String>, BenchTrailError>;
}

/// Copies every repository from one backend into another; returns the
/// number of documents copied.
pub fn migrate(
    from: &dyn HistoryBackend,
    to: &dyn HistoryBackend,
) -> Result<usize, BenchTrailError> {
    let mut copied = 0;
    for repo_url in from.repositories()? {
        if let Some(document) = from.load(&repo_url)? {
            to.persist(&document)?;
            copied += 1;
        }
    }
    info!(
        from = from.name(),
        to = to.name(),
        copied,
        "migrated history documents"
    );
    Ok(copied)
}
