use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub mod models;

/// Thread-safe SQLite connection (single connection with mutex).
///
/// Holds one row per logical dataset (`live_fixtures`, `today_fixtures`,
/// `standings_39_2024`, ...). Writes are upserts keyed by `dataset_key`;
/// the scheduler is the only writer.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// One stored snapshot: the serialized payload plus when it was captured.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    /// `":memory:"` works for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent).
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Insert or overwrite the snapshot for `dataset_key`, stamping it with
    /// the current time. Idempotent; the latest write wins.
    pub fn upsert<T: Serialize>(&self, dataset_key: &str, payload: &T) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO snapshots (dataset_key, payload, captured_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(dataset_key) DO UPDATE SET
                payload=excluded.payload,
                captured_at=excluded.captured_at",
            params![dataset_key, json, Utc::now()],
        )?;
        Ok(())
    }

    /// Fetch the snapshot stored under `dataset_key`, if any.
    pub fn get(&self, dataset_key: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, DateTime<Utc>)> = conn
            .query_row(
                "SELECT payload, captured_at FROM snapshots WHERE dataset_key=?1",
                params![dataset_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((json, captured_at)) => Ok(Some(Snapshot {
                payload: serde_json::from_str(&json)?,
                captured_at,
            })),
            None => Ok(None),
        }
    }

    /// Timestamp of the last write for `dataset_key`, without deserializing
    /// the payload.
    pub fn captured_at(&self, dataset_key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let ts = conn
            .query_row(
                "SELECT captured_at FROM snapshots WHERE dataset_key=?1",
                params![dataset_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }

    /// Delete snapshots whose last write is older than `cutoff`.
    /// Returns the number of purged rows.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let purged = conn.execute(
            "DELETE FROM snapshots WHERE captured_at < ?1",
            params![cutoff],
        )?;
        Ok(purged)
    }

    /// Number of stored snapshots (for the stats endpoint).
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))?;
        Ok(n)
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS).
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    dataset_key TEXT PRIMARY KEY,
    payload     TEXT NOT NULL,
    captured_at TEXT NOT NULL
);
"#;
