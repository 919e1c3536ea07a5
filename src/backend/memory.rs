use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use super::HistoryBackend;
use crate::{document::HistoryDocument, errors::BenchTrailError};

/// In-process backend. Clones share the same documents.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<AHashMap<String, HistoryDocument>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: HistoryDocument) -> Self {
        let backend = Self::new();
        backend
            .inner
            .write()
            .insert(document.repo_url.clone(), document);
        backend
    }

    pub fn get(&self, repo_url: &str) -> Option<HistoryDocument> {
        self.inner.read().get(repo_url).cloned()
    }
}

impl HistoryBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, repo_url: &str) -> Result<Option<HistoryDocument>, BenchTrailError> {
        Ok(self.get(repo_url))
    }

    fn persist(&self, document: &HistoryDocument) -> Result<(), BenchTrailError> {
        self.inner
            .write()
            .insert(document.repo_url.clone(), document.clone());
        Ok(())
    }

    fn discard(&self, repo_url: &str) -> Result<(), BenchTrailError> {
        self.inner.write().remove(repo_url);
        Ok(())
    }

    fn repositories(&self) -> Result<Vec<String>, BenchTrailError> {
        let mut repos: Vec<String> = self.inner.read().keys().cloned().collect();
        repos.sort();
        Ok(repos)
    }
}
