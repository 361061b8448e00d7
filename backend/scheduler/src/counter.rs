//! Crash-safe monotonic sequence counter.
//!
//! One persisted row per sequence name. `next` runs inside the caller's
//! transaction so the assigned value commits or rolls back together with the
//! row that consumes it, which is what keeps `numbered_id` strictly
//! increasing and gap-tolerant across crashes.

use anyhow::Result;
use rusqlite::{params, Transaction};

/// Sequence backing `Run::numbered_id`.
pub const RUN_SEQUENCE: &str = "run_numbered_id";

/// Atomically increment and return the next value of a named sequence.
pub fn next(tx: &Transaction<'_>, name: &str) -> Result<i64> {
    tx.execute(
        "INSERT INTO counters (name, value) VALUES (?1, 0)
         ON CONFLICT(name) DO NOTHING",
        params![name],
    )?;
    tx.execute(
        "UPDATE counters SET value = value + 1 WHERE name = ?1",
        params![name],
    )?;
    let value = tx.query_row(
        "SELECT value FROM counters WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(value)
}
