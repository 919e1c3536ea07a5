//! The history store handle.
//!
//! Every `(repository, group)` key gets its own writer thread fed by an mpsc
//! queue, so appends to one key run one at a time while different keys
//! proceed in parallel. The writer captures the pre-append snapshot,
//! persists (and publishes) the whole repository document, compares the run
//! against the captured baseline and swaps the snapshot. Readers load
//! immutable snapshots and never wait on writers.

use std::{
    collections::BTreeMap,
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, info_span, warn};

use crate::{
    backend::HistoryBackend,
    compare::{CompareConfig, Comparator, ComparisonReport},
    document::HistoryDocument,
    errors::{BenchTrailError, ValidationError},
    fault_injection::{FaultInjector, FaultPoint},
    integrity,
    model::{BenchmarkRun, Series, SeriesKey, truncate_millis},
    publish::Publisher,
    retry::{RetryPolicy, run_with_retry},
    snapshot::SeriesCell,
};

/// Result of a successful append.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendOutcome {
    pub key: SeriesKey,
    /// Position of the appended run within its series.
    pub index: usize,
    pub comparison: ComparisonReport,
}

pub struct HistoryStoreBuilder {
    backend: Box<dyn HistoryBackend>,
    publisher: Option<Box<dyn Publisher>>,
    faults: Option<Arc<FaultInjector>>,
    compare: CompareConfig,
    retry: RetryPolicy,
    deadline: Option<Duration>,
}

impl HistoryStoreBuilder {
    pub fn compare(mut self, compare: CompareConfig) -> Self {
        self.compare = compare;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn publisher(mut self, publisher: impl Publisher + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    pub fn faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Upper bound on the time one append may spend persisting and publishing.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn build(self) -> HistoryStore {
        HistoryStore {
            inner: Arc::new(StoreInner {
                backend: self.backend,
                publisher: self.publisher,
                faults: self.faults,
                comparator: Comparator::new(self.compare),
                retry: self.retry,
                deadline: self.deadline,
                repos: RwLock::new(AHashMap::new()),
            }),
            writers: Mutex::new(AHashMap::new()),
        }
    }
}

pub struct HistoryStore {
    inner: Arc<StoreInner>,
    writers: Mutex<AHashMap<SeriesKey, WriterHandle>>,
}

impl HistoryStore {
    pub fn new(backend: impl HistoryBackend + 'static) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: impl HistoryBackend + 'static) -> HistoryStoreBuilder {
        Self::builder_boxed(Box::new(backend))
    }

    pub fn builder_boxed(backend: Box<dyn HistoryBackend>) -> HistoryStoreBuilder {
        HistoryStoreBuilder {
            backend,
            publisher: None,
            faults: None,
            compare: CompareConfig::default(),
            retry: RetryPolicy::default(),
            deadline: None,
        }
    }

    pub fn backend(&self) -> &dyn HistoryBackend {
        self.inner.backend.as_ref()
    }

    /// Appends `run` to the series of `(repo_url, group)` and compares it
    /// against the series as it was just before the append.
    ///
    /// Fails with `OutOfOrder` when `run.date` is older than the last stored
    /// run. On any error nothing is persisted and the series is unchanged.
    pub fn append(
        &self,
        repo_url: &str,
        group: &str,
        run: BenchmarkRun,
    ) -> Result<AppendOutcome, BenchTrailError> {
        let key = SeriesKey::new(repo_url, group);
        let sender = self.sender_for(&key)?;
        let (response, outcome) = mpsc::channel();
        let job = AppendJob {
            run,
            deadline: self.inner.deadline.map(|limit| Instant::now() + limit),
            response,
        };
        sender
            .send(job)
            .map_err(|_| BenchTrailError::store_io(format!("writer for {key} has stopped")))?;
        outcome.recv().map_err(|_| {
            BenchTrailError::store_io(format!("writer for {key} exited before replying"))
        })?
    }

    /// Current snapshot of a series. A key never written reads as empty.
    pub fn read(&self, repo_url: &str, group: &str) -> Result<Arc<Series>, BenchTrailError> {
        let repo = self.inner.repo(repo_url)?;
        Ok(repo.snapshot(group))
    }

    /// Compares `run` against the current snapshot without storing anything.
    pub fn compare(
        &self,
        repo_url: &str,
        group: &str,
        run: &BenchmarkRun,
    ) -> Result<ComparisonReport, BenchTrailError> {
        let baseline = self.read(repo_url, group)?;
        Ok(self.inner.comparator.compare(&baseline, run))
    }

    pub fn groups(&self, repo_url: &str) -> Result<Vec<String>, BenchTrailError> {
        let repo = self.inner.repo(repo_url)?;
        let groups = repo.series.read().keys().cloned().collect();
        Ok(groups)
    }

    pub fn document(&self, repo_url: &str) -> Result<HistoryDocument, BenchTrailError> {
        let repo = self.inner.repo(repo_url)?;
        let persisted = repo.persisted.lock();
        Ok(repo.document(persisted.last_update, None))
    }

    fn sender_for(&self, key: &SeriesKey) -> Result<mpsc::Sender<AppendJob>, BenchTrailError> {
        let mut writers = self.writers.lock();
        if let Some(handle) = writers.get(key) {
            return Ok(handle.sender.clone());
        }
        let (sender, jobs) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let thread_key = key.clone();
        let thread = thread::Builder::new()
            .name(format!("benchtrail-writer-{}", key.group))
            .spawn(move || writer_loop(inner, thread_key, jobs))
            .map_err(|e| BenchTrailError::store_io(format!("spawn writer for {key}: {e}")))?;
        writers.insert(
            key.clone(),
            WriterHandle {
                sender: sender.clone(),
                thread,
            },
        );
        Ok(sender)
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        let writers = std::mem::take(&mut *self.writers.lock());
        for (key, WriterHandle { sender, thread }) in writers {
            drop(sender);
            if thread.join().is_err() {
                error!(key = %key, "writer thread panicked");
            }
        }
    }
}

struct WriterHandle {
    sender: mpsc::Sender<AppendJob>,
    thread: JoinHandle<()>,
}

struct AppendJob {
    run: BenchmarkRun,
    deadline: Option<Instant>,
    response: mpsc::Sender<Result<AppendOutcome, BenchTrailError>>,
}

fn writer_loop(inner: Arc<StoreInner>, key: SeriesKey, jobs: mpsc::Receiver<AppendJob>) {
    let span = info_span!("writer", repo = %key.repo_url, group = %key.group);
    let _entered = span.enter();
    for job in jobs {
        let result = inner.apply_append(&key, job.run, job.deadline);
        if job.response.send(result).is_err() {
            warn!("append caller went away before the reply");
        }
    }
}

struct StoreInner {
    backend: Box<dyn HistoryBackend>,
    publisher: Option<Box<dyn Publisher>>,
    faults: Option<Arc<FaultInjector>>,
    comparator: Comparator,
    retry: RetryPolicy,
    deadline: Option<Duration>,
    repos: RwLock<AHashMap<String, Arc<RepoState>>>,
}

impl StoreInner {
    fn repo(&self, repo_url: &str) -> Result<Arc<RepoState>, BenchTrailError> {
        if let Some(repo) = self.repos.read().get(repo_url) {
            return Ok(Arc::clone(repo));
        }
        let document = run_with_retry(&self.retry, None, "load", |_| {
            self.backend.load(repo_url)
        })?;
        let loaded = Arc::new(match document {
            Some(document) => RepoState::from_document(document),
            None => RepoState::empty(repo_url),
        });
        // Another caller may have finished loading the same repository first.
        let repo = self
            .repos
            .write()
            .entry(repo_url.to_string())
            .or_insert(loaded)
            .clone();
        Ok(repo)
    }

    fn check_fault(&self, point: FaultPoint) -> Result<(), BenchTrailError> {
        match &self.faults {
            Some(faults) => faults.check(point),
            None => Ok(()),
        }
    }

    fn apply_append(
        &self,
        key: &SeriesKey,
        run: BenchmarkRun,
        deadline: Option<Instant>,
    ) -> Result<AppendOutcome, BenchTrailError> {
        integrity::check_run(&run)?;
        let repo = self.repo(&key.repo_url)?;
        let before = repo.snapshot(&key.group);
        if let Some(last) = before.last_date()
            && run.date < last
        {
            warn!(last = %last, attempted = %run.date, "rejected out-of-order run");
            return Err(ValidationError::OutOfOrder {
                last,
                attempted: run.date,
            }
            .into());
        }
        let index = before.len();
        let next = before.appended(run);

        let mut persisted = repo.persisted.lock();
        let previous = persisted
            .stored
            .then(|| repo.document(persisted.last_update, None));
        let updated_at = truncate_millis(Utc::now());
        let updated = repo.document(updated_at, Some(&next));

        run_with_retry(&self.retry, deadline, "persist", |_| {
            self.check_fault(FaultPoint::PersistDocument)?;
            self.backend.persist(&updated)
        })?;

        if let Some(publisher) = &self.publisher {
            let published = run_with_retry(&self.retry, deadline, "publish", |_| {
                self.check_fault(FaultPoint::Publish)?;
                publisher.publish(&updated)
            });
            if let Err(err) = published {
                warn!(publisher = publisher.name(), "publish failed: {err}");
                self.roll_back(&key.repo_url, previous.as_ref());
                return Err(err);
            }
        }

        let comparison = self.comparator.compare(&before, &next.runs()[index]);
        let commit_id = next.runs()[index].commit.id.clone();
        repo.install(&key.group, next);
        persisted.last_update = updated_at;
        persisted.stored = true;
        drop(persisted);

        info!(
            commit = %commit_id,
            index,
            regressions = comparison.regressions().count(),
            "appended run"
        );
        Ok(AppendOutcome {
            key: key.clone(),
            index,
            comparison,
        })
    }

    /// Puts the backend back to its pre-append state. A repository that was
    /// never persisted before is discarded rather than stored empty.
    fn roll_back(&self, repo_url: &str, previous: Option<&HistoryDocument>) {
        let restored = run_with_retry(&self.retry, None, "rollback", |_| match previous {
            Some(document) => self.backend.persist(document),
            None => self.backend.discard(repo_url),
        });
        match restored {
            Ok(()) => warn!(repo = %repo_url, "restored previous document"),
            Err(err) => error!(repo = %repo_url, "rollback failed: {err}"),
        }
    }
}

struct RepoState {
    repo_url: String,
    series: RwLock<BTreeMap<String, Arc<SeriesCell>>>,
    /// Serializes document persistence for the repository.
    persisted: Mutex<PersistState>,
}

struct PersistState {
    last_update: DateTime<Utc>,
    /// Whether the backend holds a document for the repository.
    stored: bool,
}

impl RepoState {
    fn empty(repo_url: &str) -> Self {
        Self {
            repo_url: repo_url.to_string(),
            series: RwLock::new(BTreeMap::new()),
            persisted: Mutex::new(PersistState {
                last_update: truncate_millis(Utc::now()),
                stored: false,
            }),
        }
    }

    fn from_document(document: HistoryDocument) -> Self {
        let report = integrity::run_integrity_checks(&document);
        if report.has_issues() {
            for detail in &report.details {
                warn!(repo = %document.repo_url, "integrity: {detail}");
            }
        }
        let HistoryDocument {
            last_update,
            repo_url,
            entries,
        } = document;
        let series = entries
            .into_iter()
            .map(|(group, runs)| {
                let key = SeriesKey::new(repo_url.clone(), group.clone());
                (group, Arc::new(SeriesCell::new(Series::from_runs(key, runs))))
            })
            .collect();
        Self {
            repo_url,
            series: RwLock::new(series),
            persisted: Mutex::new(PersistState {
                last_update,
                stored: true,
            }),
        }
    }

    fn snapshot(&self, group: &str) -> Arc<Series> {
        match self.series.read().get(group) {
            Some(cell) => cell.load(),
            None => Arc::new(Series::empty(SeriesKey::new(self.repo_url.clone(), group))),
        }
    }

    fn install(&self, group: &str, next: Series) {
        let mut series = self.series.write();
        match series.get(group) {
            Some(cell) => cell.swap(next),
            None => {
                series.insert(group.to_string(), Arc::new(SeriesCell::new(next)));
            }
        }
    }

    /// Builds the repository document from the current snapshots, with
    /// `replacement` standing in for its own group.
    fn document(&self, last_update: DateTime<Utc>, replacement: Option<&Series>) -> HistoryDocument {
        let mut entries: BTreeMap<String, Vec<BenchmarkRun>> = self
            .series
            .read()
            .iter()
            .map(|(group, cell)| (group.clone(), cell.load().runs().to_vec()))
            .collect();
        if let Some(series) = replacement {
            entries.insert(series.key().group.clone(), series.runs().to_vec());
        }
        HistoryDocument {
            last_update,
            repo_url: self.repo_url.clone(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        backend::MemoryBackend,
        model::{BenchResult, CommitInfo, Person, ToolKind},
    };

    fn run_at(secs: i64, value: f64) -> BenchmarkRun {
        BenchmarkRun::new(
            CommitInfo {
                author: Person::new("dev"),
                committer: Person::new("dev"),
                distinct: None,
                id: format!("c{secs}"),
                message: String::new(),
                timestamp: Utc.timestamp_opt(secs, 0).unwrap().fixed_offset(),
                tree_id: None,
                url: String::new(),
            },
            Utc.timestamp_opt(secs, 0).unwrap(),
            ToolKind::CustomSmallerIsBetter,
            vec![BenchResult::new("latency", value, "ms")],
        )
    }

    #[test]
    fn first_append_has_no_baseline_and_index_zero() {
        let store = HistoryStore::new(MemoryBackend::new());
        let outcome = store.append("https://r", "g", run_at(100, 1.0)).unwrap();
        assert_eq!(outcome.index, 0);
        assert_eq!(outcome.comparison.verdicts.len(), 1);
        assert!(!outcome.comparison.has_regression());
        assert_eq!(store.groups("https://r").unwrap(), vec!["g".to_string()]);
    }

    #[test]
    fn document_reflects_appends_across_groups() {
        let backend = MemoryBackend::new();
        let store = HistoryStore::new(backend.clone());
        store.append("https://r", "a", run_at(100, 1.0)).unwrap();
        store.append("https://r", "b", run_at(50, 1.0)).unwrap();
        store.append("https://r", "a", run_at(200, 1.0)).unwrap();
        let persisted = backend.get("https://r").unwrap();
        assert_eq!(persisted.entries["a"].len(), 2);
        assert_eq!(persisted.entries["b"].len(), 1);
        assert_eq!(store.document("https://r").unwrap(), persisted);
    }
}
