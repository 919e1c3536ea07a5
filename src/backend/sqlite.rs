use std::{collections::BTreeMap, path::Path, sync::Arc};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::HistoryBackend;
use crate::{
    document::HistoryDocument,
    errors::BenchTrailError,
    fault_injection::{FaultInjector, FaultPoint},
    model::BenchmarkRun,
    schema::ensure_schema,
};

/// SQLite-backed history. One row per run; the row payload is the run's
/// wire-format JSON so a loaded document is identical to the persisted one.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    faults: Option<Arc<FaultInjector>>,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BenchTrailError> {
        let conn = Connection::open(path).map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, BenchTrailError> {
        let conn =
            Connection::open_in_memory().map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            faults: None,
        }
    }

    pub fn run_count(&self, repo_url: &str) -> Result<i64, BenchTrailError> {
        self.conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM history_runs WHERE repo_url=?1",
                params![repo_url],
                |row| row.get(0),
            )
            .map_err(|e| BenchTrailError::store_io(e.to_string()))
    }

    fn write_document(
        conn: &Connection,
        document: &HistoryDocument,
    ) -> Result<(), BenchTrailError> {
        conn.execute(
            "INSERT INTO history_repos(repo_url, last_update) VALUES(?1, ?2)
             ON CONFLICT(repo_url) DO UPDATE SET last_update=excluded.last_update",
            params![document.repo_url, document.last_update.timestamp_millis()],
        )
        .map_err(|e| BenchTrailError::store_io(e.to_string()))?;

        let mut stored = stored_counts(conn, &document.repo_url)?;
        let mut stmt_insert = conn
            .prepare_cached(
                "INSERT INTO history_runs(repo_url, group_key, seq, date, commit_id, payload)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        let mut stmt_trim = conn
            .prepare_cached(
                "DELETE FROM history_runs WHERE repo_url=?1 AND group_key=?2 AND seq>=?3",
            )
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;

        for (group, runs) in &document.entries {
            let existing = stored.remove(group.as_str()).unwrap_or(0);
            if runs.len() < existing {
                stmt_trim
                    .execute(params![document.repo_url, group, runs.len() as i64])
                    .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
            }
            for (seq, run) in runs.iter().enumerate().skip(existing) {
                let payload = serde_json::to_string(run)
                    .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
                stmt_insert
                    .execute(params![
                        document.repo_url,
                        group,
                        seq as i64,
                        run.date.timestamp_millis(),
                        run.commit.id,
                        payload,
                    ])
                    .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
            }
        }
        for group in stored.keys() {
            stmt_trim
                .execute(params![document.repo_url, group, 0i64])
                .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        }
        Ok(())
    }
}

impl HistoryBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self, repo_url: &str) -> Result<Option<HistoryDocument>, BenchTrailError> {
        let conn = self.conn.lock();
        let last_update: Option<i64> = conn
            .query_row(
                "SELECT last_update FROM history_repos WHERE repo_url=?1",
                params![repo_url],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        let Some(last_update) = last_update else {
            return Ok(None);
        };
        let last_update = DateTime::<Utc>::from_timestamp_millis(last_update).ok_or_else(|| {
            BenchTrailError::corrupt_history(format!("last_update {last_update} out of range"))
        })?;

        let mut stmt = conn
            .prepare_cached(
                "SELECT group_key, payload FROM history_runs WHERE repo_url=?1 ORDER BY group_key, seq",
            )
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        let rows = stmt
            .query_map(params![repo_url], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        let mut entries: BTreeMap<String, Vec<BenchmarkRun>> = BTreeMap::new();
        for row in rows {
            let (group, payload) = row.map_err(|e| BenchTrailError::store_io(e.to_string()))?;
            let run: BenchmarkRun = serde_json::from_str(&payload)
                .map_err(|e| BenchTrailError::corrupt_history(format!("{group}: {e}")))?;
            entries.entry(group).or_default().push(run);
        }
        Ok(Some(HistoryDocument {
            last_update,
            repo_url: repo_url.to_string(),
            entries,
        }))
    }

    fn persist(&self, document: &HistoryDocument) -> Result<(), BenchTrailError> {
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        let result = Self::write_document(&conn, document).and_then(|_| match &self.faults {
            Some(faults) => faults.check(FaultPoint::SqliteBeforeCommit),
            None => Ok(()),
        });
        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])
                    .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
                debug!(
                    repo = %document.repo_url,
                    runs = document.run_count(),
                    "committed history document"
                );
                Ok(())
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(err)
            }
        }
    }

    fn discard(&self, repo_url: &str) -> Result<(), BenchTrailError> {
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        let result = conn
            .execute("DELETE FROM history_runs WHERE repo_url=?1", params![repo_url])
            .and_then(|_| {
                conn.execute("DELETE FROM history_repos WHERE repo_url=?1", params![repo_url])
            })
            .map_err(|e| BenchTrailError::store_io(e.to_string()));
        match result {
            Ok(_) => conn
                .execute("COMMIT", [])
                .map(|_| ())
                .map_err(|e| BenchTrailError::store_io(e.to_string())),
            Err(err) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(err)
            }
        }
    }

    fn repositories(&self) -> Result<Vec<String>, BenchTrailError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT repo_url FROM history_repos ORDER BY repo_url")
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        rows.map(|row| row.map_err(|e| BenchTrailError::store_io(e.to_string())))
            .collect()
    }
}

fn stored_counts(
    conn: &Connection,
    repo_url: &str,
) -> Result<AHashMap<String, usize>, BenchTrailError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT group_key, COUNT(*) FROM history_runs WHERE repo_url=?1 GROUP BY group_key",
        )
        .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
    let rows = stmt
        .query_map(params![repo_url], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|e| BenchTrailError::store_io(e.to_string()))?;
    let mut counts = AHashMap::new();
    for row in rows {
        let (group, count) = row.map_err(|e| BenchTrailError::store_io(e.to_string()))?;
        counts.insert(group, count.max(0) as usize);
    }
    Ok(counts)
}
