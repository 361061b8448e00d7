//! SQLite-backed durable store for schedules, runs, and counters.
//!
//! A single connection backs all three tables so the fire path can update
//! them in one transaction. Concurrency accounting is always derived from
//! the `runs` table, never cached in memory, so a restart reconstructs
//! correct state from persisted rows alone.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open or create the store at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("open schedule engine database")?;
        let db = Self { conn };
        db.init_schema()?;
        info!(path = %path, "Schedule engine database opened");
        Ok(db)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS schedules (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                action_id           TEXT NOT NULL,
                spec                TEXT NOT NULL,
                timezone            TEXT NOT NULL,
                enabled             INTEGER NOT NULL DEFAULT 1,
                skip_if_running     INTEGER NOT NULL DEFAULT 0,
                max_concurrent      INTEGER NOT NULL DEFAULT 1,
                timeout_seconds     INTEGER NOT NULL,
                retry_enabled       INTEGER NOT NULL DEFAULT 0,
                retry_max_attempts  INTEGER NOT NULL DEFAULT 0,
                retry_delay_seconds INTEGER NOT NULL DEFAULT 0,
                notify_on_failure   INTEGER NOT NULL DEFAULT 0,
                last_fired_at       INTEGER,
                created_at          INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS runs (
                id              TEXT PRIMARY KEY,
                numbered_id     INTEGER NOT NULL UNIQUE,
                action_id       TEXT NOT NULL,
                schedule_id     TEXT,
                status          TEXT NOT NULL,
                not_before      INTEGER NOT NULL,
                start_time      INTEGER,
                run_time_ms     INTEGER,
                attempt_number  INTEGER NOT NULL DEFAULT 1,
                timeout_seconds INTEGER NOT NULL,
                inputs          TEXT NOT NULL,
                result          TEXT,
                error_message   TEXT,
                artifacts_path  TEXT,
                created_at      INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS runs_schedule_status ON runs(schedule_id, status);
            CREATE INDEX IF NOT EXISTS runs_status_not_before ON runs(status, not_before);
            CREATE TABLE IF NOT EXISTS counters (
                name  TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

/// Epoch milliseconds for storage.
pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
