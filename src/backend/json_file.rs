use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use super::HistoryBackend;
use crate::{document::HistoryDocument, errors::BenchTrailError};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Layout {
    /// One file per repository under a directory.
    Directory(PathBuf),
    /// A single history file, e.g. a pages branch `data.js`.
    SingleFile(PathBuf),
}

/// JSON documents on the local filesystem. Files ending in `.js` use the
/// `window.BENCHMARK_DATA` envelope. Every write goes to a temporary file in
/// the same directory and is renamed into place.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    layout: Layout,
}

impl JsonFileBackend {
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::Directory(dir.into()),
        }
    }

    pub fn single_file(path: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::SingleFile(path.into()),
        }
    }

    /// Paths ending in `.json` or `.js` select single-file mode.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") | Some("js") => Self::single_file(path),
            _ => Self::directory(path),
        }
    }

    pub fn path_for(&self, repo_url: &str) -> PathBuf {
        match &self.layout {
            Layout::Directory(dir) => dir.join(file_name_for(repo_url)),
            Layout::SingleFile(path) => path.clone(),
        }
    }

    fn read_document(path: &Path) -> Result<Option<HistoryDocument>, BenchTrailError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)
            .map_err(|e| BenchTrailError::store_io(format!("{}: {e}", path.display())))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        text.parse::<HistoryDocument>().map(Some)
    }
}

impl HistoryBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self, repo_url: &str) -> Result<Option<HistoryDocument>, BenchTrailError> {
        let path = self.path_for(repo_url);
        let document = Self::read_document(&path)?;
        if let Some(doc) = &document
            && doc.repo_url != repo_url
        {
            return Err(BenchTrailError::config(format!(
                "{} holds history for {}, not {repo_url}",
                path.display(),
                doc.repo_url
            )));
        }
        Ok(document)
    }

    fn persist(&self, document: &HistoryDocument) -> Result<(), BenchTrailError> {
        let path = self.path_for(&document.repo_url);
        let body = if is_script(&path) {
            document.to_data_js()?
        } else {
            document.to_json_string()?
        };
        write_atomically(&path, body.as_bytes())?;
        debug!(path = %path.display(), bytes = body.len(), "wrote history document");
        Ok(())
    }

    fn discard(&self, repo_url: &str) -> Result<(), BenchTrailError> {
        let path = self.path_for(repo_url);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed history document");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BenchTrailError::store_io(format!("{}: {e}", path.display()))),
        }
    }

    fn repositories(&self) -> Result<Vec<String>, BenchTrailError> {
        let paths = match &self.layout {
            Layout::SingleFile(path) => vec![path.clone()],
            Layout::Directory(dir) => {
                if !dir.exists() {
                    return Ok(Vec::new());
                }
                let mut paths = Vec::new();
                let entries = fs::read_dir(dir)
                    .map_err(|e| BenchTrailError::store_io(format!("{}: {e}", dir.display())))?;
                for entry in entries {
                    let entry = entry.map_err(|e| BenchTrailError::store_io(e.to_string()))?;
                    let path = entry.path();
                    if matches!(
                        path.extension().and_then(|ext| ext.to_str()),
                        Some("json") | Some("js")
                    ) {
                        paths.push(path);
                    }
                }
                paths
            }
        };
        let mut repos = Vec::new();
        for path in paths {
            if let Some(document) = Self::read_document(&path)? {
                repos.push(document.repo_url);
            }
        }
        repos.sort();
        repos.dedup();
        Ok(repos)
    }
}

pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), BenchTrailError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .map_err(|e| BenchTrailError::store_io(format!("{}: {e}", parent.display())))?;
    let mut file = NamedTempFile::new_in(&parent)
        .map_err(|e| BenchTrailError::store_io(format!("{}: {e}", parent.display())))?;
    file.write_all(bytes)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| BenchTrailError::store_io(format!("{}: {e}", path.display())))?;
    file.persist(path)
        .map_err(|e| BenchTrailError::store_io(format!("{}: {}", path.display(), e.error)))?;
    Ok(())
}

pub(crate) fn is_script(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("js")
}

/// `https://github.com/owner/repo` becomes `github.com_owner_repo.json`.
fn file_name_for(repo_url: &str) -> String {
    let stripped = repo_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(repo_url);
    let slug: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches(|c| c == '_' || c == '.');
    if slug.is_empty() {
        "repository.json".to_string()
    } else {
        format!("{slug}.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_filesystem_safe() {
        assert_eq!(
            file_name_for("https://github.com/owner/repo"),
            "github.com_owner_repo.json"
        );
        assert_eq!(file_name_for("git@host:a/b.git"), "git_host_a_b.git.json");
        assert_eq!(file_name_for("://"), "repository.json");
    }

    #[test]
    fn extension_selects_layout() {
        let single = JsonFileBackend::open("pages/dev/bench/data.js");
        assert_eq!(
            single.path_for("https://x"),
            PathBuf::from("pages/dev/bench/data.js")
        );
        let dir = JsonFileBackend::open("history");
        assert_eq!(
            dir.path_for("https://github.com/o/r"),
            PathBuf::from("history/github.com_o_r.json")
        );
    }
}
