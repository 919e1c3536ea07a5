use rusqlite::Connection;

use crate::errors::BenchTrailError;

pub fn ensure_schema(conn: &Connection) -> Result<(), BenchTrailError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS history_repos (
            repo_url    TEXT PRIMARY KEY,
            last_update INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS history_runs (
            repo_url  TEXT NOT NULL REFERENCES history_repos(repo_url),
            group_key TEXT NOT NULL,
            seq       INTEGER NOT NULL,
            date      INTEGER NOT NULL,
            commit_id TEXT NOT NULL,
            payload   TEXT NOT NULL,
            PRIMARY KEY (repo_url, group_key, seq)
        );
        CREATE INDEX IF NOT EXISTS idx_runs_commit ON history_runs(commit_id);
        CREATE INDEX IF NOT EXISTS idx_runs_date ON history_runs(repo_url, group_key, date);
        "#,
    )
    .map_err(|e| BenchTrailError::store_io(format!("schema: {e}")))?;
    Ok(())
}
