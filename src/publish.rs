//! Publishing copies the persisted document to an external artifact location,
//! such as a checkout of a pages branch. Publishing is retried by the store;
//! a publisher only has to make a single attempt.

use std::path::PathBuf;

use tracing::info;

use crate::{
    backend::json_file::write_atomically,
    document::HistoryDocument,
    errors::BenchTrailError,
};

pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;
    fn publish(&self, document: &HistoryDocument) -> Result<(), BenchTrailError>;
}

pub const PUBLISHED_FILE: &str = "data.js";

/// Writes the document into a directory as `data.js`.
#[derive(Clone, Debug)]
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn target(&self) -> PathBuf {
        self.dir.join(PUBLISHED_FILE)
    }
}

impl Publisher for DirectoryPublisher {
    fn name(&self) -> &str {
        "directory"
    }

    fn publish(&self, document: &HistoryDocument) -> Result<(), BenchTrailError> {
        let target = self.target();
        let body = document.to_data_js()?;
        write_atomically(&target, body.as_bytes())?;
        info!(path = %target.display(), repo = %document.repo_url, "published history");
        Ok(())
    }
}
