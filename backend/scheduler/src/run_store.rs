//! Durable run history.
//!
//! Every execution attempt is a row here: the audit trail, the retry queue
//! (pending rows with a future `not_before`), and the source of truth for
//! concurrency accounting. Terminal rows are never mutated.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Transaction};
use uuid::Uuid;

use runforge_core::{Run, RunStatus};

use crate::counter;
use crate::store::{from_millis, to_millis, Database};

const RUN_COLUMNS: &str = "id, numbered_id, action_id, schedule_id, status, not_before, \
     start_time, run_time_ms, attempt_number, timeout_seconds, inputs, result, \
     error_message, artifacts_path, created_at";

/// Fields the caller chooses when creating a run row.
pub struct NewRun<'a> {
    pub action_id: &'a str,
    pub schedule_id: Option<Uuid>,
    pub status: RunStatus,
    pub attempt_number: u32,
    pub timeout_seconds: u64,
    pub inputs: serde_json::Value,
    pub not_before: DateTime<Utc>,
}

type RunRow = (
    String,          // id
    i64,             // numbered_id
    String,          // action_id
    Option<String>,  // schedule_id
    String,          // status
    i64,             // not_before
    Option<i64>,     // start_time
    Option<i64>,     // run_time_ms
    i64,             // attempt_number
    i64,             // timeout_seconds
    String,          // inputs
    Option<String>,  // result
    Option<String>,  // error_message
    Option<String>,  // artifacts_path
    i64,             // created_at
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
    ))
}

fn parse_run(raw: RunRow) -> Option<Run> {
    Some(Run {
        id: Uuid::parse_str(&raw.0).ok()?,
        numbered_id: raw.1,
        action_id: raw.2,
        schedule_id: raw.3.and_then(|s| Uuid::parse_str(&s).ok()),
        status: raw.4.parse().ok()?,
        not_before: from_millis(raw.5),
        start_time: raw.6.map(from_millis),
        run_time_ms: raw.7,
        attempt_number: raw.8 as u32,
        timeout_seconds: raw.9 as u64,
        inputs: serde_json::from_str(&raw.10).ok()?,
        result: raw.11.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: raw.12,
        artifacts_path: raw.13,
        created_at: from_millis(raw.14),
    })
}

fn insert_run_tx(tx: &Transaction<'_>, new: &NewRun<'_>, now: DateTime<Utc>) -> Result<Run> {
    let numbered_id = counter::next(tx, counter::RUN_SEQUENCE)?;
    let run = Run {
        id: Uuid::new_v4(),
        numbered_id,
        action_id: new.action_id.to_string(),
        schedule_id: new.schedule_id,
        status: new.status,
        not_before: new.not_before,
        start_time: None,
        run_time_ms: None,
        attempt_number: new.attempt_number,
        timeout_seconds: new.timeout_seconds,
        inputs: new.inputs.clone(),
        result: None,
        error_message: None,
        artifacts_path: None,
        created_at: now,
    };
    tx.execute(
        &format!(
            "INSERT INTO runs ({RUN_COLUMNS})
             VALUES (?1,?2,?3,?4,?5,?6,NULL,NULL,?7,?8,?9,NULL,NULL,NULL,?10)"
        ),
        params![
            run.id.to_string(),
            run.numbered_id,
            run.action_id,
            run.schedule_id.map(|id| id.to_string()),
            run.status.as_str(),
            to_millis(run.not_before),
            run.attempt_number as i64,
            run.timeout_seconds as i64,
            serde_json::to_string(&run.inputs)?,
            to_millis(run.created_at),
        ],
    )?;
    Ok(run)
}

impl Database {
    /// Create a run row with a fresh `numbered_id` (on-demand submissions
    /// and retry attempts).
    pub fn create_run(&mut self, new: NewRun<'_>, now: DateTime<Utc>) -> Result<Run> {
        let tx = self.conn.transaction()?;
        let run = insert_run_tx(&tx, &new, now)?;
        tx.commit()?;
        Ok(run)
    }

    /// The fire transaction: create the occurrence row and advance the
    /// schedule's `last_fired_at` (optionally disabling it, for `once`) in
    /// one transaction. This is what makes dispatch idempotent for a given
    /// `(schedule, fire_instant)` across process restarts.
    pub fn create_occurrence(
        &mut self,
        new: NewRun<'_>,
        last_fired_at: DateTime<Utc>,
        disable: bool,
        now: DateTime<Utc>,
    ) -> Result<Run> {
        let schedule_id = new
            .schedule_id
            .ok_or_else(|| anyhow::anyhow!("occurrence requires a schedule"))?;
        let tx = self.conn.transaction()?;
        let run = insert_run_tx(&tx, &new, now)?;
        Database::mark_fired_tx(&tx, schedule_id, last_fired_at, disable)?;
        tx.commit()?;
        Ok(run)
    }

    pub fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"))?;
        let run = stmt
            .query_map(params![id.to_string()], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_run)
            .next();
        Ok(run)
    }

    /// Pending runs whose `not_before` has passed, oldest occurrence first.
    pub fn due_pending(&self, now: DateTime<Utc>) -> Result<Vec<Run>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs
             WHERE status = 'pending' AND not_before <= ?1
             ORDER BY numbered_id ASC"
        ))?;
        let runs = stmt
            .query_map(params![to_millis(now)], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_run)
            .collect();
        Ok(runs)
    }

    /// Running rows whose deadline has passed without a completion.
    pub fn running_past_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Run>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs
             WHERE status = 'running' AND start_time IS NOT NULL
               AND start_time + timeout_seconds * 1000 <= ?1
             ORDER BY numbered_id ASC"
        ))?;
        let runs = stmt
            .query_map(params![to_millis(now)], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_run)
            .collect();
        Ok(runs)
    }

    /// Derived concurrency accounting; recomputed from rows, never cached.
    pub fn count_running(&self, schedule_id: Uuid) -> Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE schedule_id = ?1 AND status = 'running'",
            params![schedule_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Transition pending → running. Returns false if the row was not
    /// pending anymore.
    pub fn mark_running(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let n = self.conn.execute(
            "UPDATE runs SET status = 'running', start_time = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id.to_string(), to_millis(now)],
        )?;
        Ok(n > 0)
    }

    /// Move a non-terminal row into a terminal state. Returns false if the
    /// row was already terminal (or missing): terminal rows are immutable.
    pub fn finalize(
        &self,
        id: Uuid,
        status: RunStatus,
        result: Option<&serde_json::Value>,
        error_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(run) = self.get_run(id)? else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }
        let run_time_ms = run.start_time.map(|started| (now - started).num_milliseconds());
        let result_json = result.map(serde_json::to_string).transpose()?;
        let n = self.conn.execute(
            "UPDATE runs SET status = ?2, result = ?3, error_message = ?4, run_time_ms = ?5
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![
                id.to_string(),
                status.as_str(),
                result_json,
                error_message,
                run_time_ms,
            ],
        )?;
        Ok(n > 0)
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY numbered_id DESC LIMIT ?1"
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_run)
            .collect();
        Ok(runs)
    }

    pub fn runs_for_schedule(&self, schedule_id: Uuid, limit: usize) -> Result<Vec<Run>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE schedule_id = ?1
             ORDER BY numbered_id DESC LIMIT ?2"
        ))?;
        let runs = stmt
            .query_map(params![schedule_id.to_string(), limit as i64], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_run)
            .collect();
        Ok(runs)
    }

    /// Delete terminal rows older than `max_age`. Returns rows removed.
    pub fn prune_runs(&self, max_age: Duration, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = to_millis(now - max_age);
        let n = self.conn.execute(
            "DELETE FROM runs WHERE created_at < ?1
             AND status IN ('success', 'failed', 'timeout', 'skipped', 'cancelled')",
            params![cutoff],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(action: &str, not_before: DateTime<Utc>) -> NewRun<'_> {
        NewRun {
            action_id: action,
            schedule_id: None,
            status: RunStatus::Pending,
            attempt_number: 1,
            timeout_seconds: 300,
            inputs: json!({}),
            not_before,
        }
    }

    #[test]
    fn numbered_ids_increase() {
        let mut db = Database::in_memory().unwrap();
        let now = Utc::now();
        let a = db.create_run(pending("a", now), now).unwrap();
        let b = db.create_run(pending("b", now), now).unwrap();
        let c = db.create_run(pending("c", now), now).unwrap();
        assert!(a.numbered_id < b.numbered_id && b.numbered_id < c.numbered_id);
        assert_eq!(a.numbered_id, 1);
    }

    #[test]
    fn due_pending_filters_and_orders() {
        let mut db = Database::in_memory().unwrap();
        let now = Utc::now();
        let early = db.create_run(pending("early", now - Duration::seconds(10)), now).unwrap();
        let later = db.create_run(pending("later", now), now).unwrap();
        let future = db.create_run(pending("future", now + Duration::seconds(60)), now).unwrap();

        let due = db.due_pending(now).unwrap();
        let ids: Vec<i64> = due.iter().map(|r| r.numbered_id).collect();
        assert_eq!(ids, vec![early.numbered_id, later.numbered_id]);
        assert!(!due.iter().any(|r| r.id == future.id));
    }

    #[test]
    fn count_running_is_scoped_to_schedule() {
        let mut db = Database::in_memory().unwrap();
        let now = Utc::now();
        let sched = Uuid::new_v4();
        let other = Uuid::new_v4();
        for schedule_id in [Some(sched), Some(sched), Some(other), None] {
            let run = db
                .create_run(
                    NewRun { schedule_id, ..pending("a", now) },
                    now,
                )
                .unwrap();
            db.mark_running(run.id, now).unwrap();
        }
        assert_eq!(db.count_running(sched).unwrap(), 2);
        assert_eq!(db.count_running(other).unwrap(), 1);
    }

    #[test]
    fn finalize_records_duration_and_result() {
        let mut db = Database::in_memory().unwrap();
        let now = Utc::now();
        let run = db.create_run(pending("a", now), now).unwrap();
        db.mark_running(run.id, now).unwrap();

        let done = now + Duration::seconds(12);
        let result = json!({"rows": 3});
        assert!(db.finalize(run.id, RunStatus::Success, Some(&result), None, done).unwrap());

        let loaded = db.get_run(run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Success);
        assert_eq!(loaded.run_time_ms, Some(12_000));
        assert_eq!(loaded.result, Some(result));
    }

    #[test]
    fn terminal_rows_are_immutable() {
        let mut db = Database::in_memory().unwrap();
        let now = Utc::now();
        let run = db.create_run(pending("a", now), now).unwrap();
        db.mark_running(run.id, now).unwrap();
        assert!(db
            .finalize(run.id, RunStatus::Timeout, None, Some("no completion"), now)
            .unwrap());

        // Late completion after a forced timeout must not alter the row.
        assert!(!db
            .finalize(run.id, RunStatus::Success, Some(&json!({})), None, now)
            .unwrap());
        let loaded = db.get_run(run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Timeout);
        assert_eq!(loaded.error_message.as_deref(), Some("no completion"));
    }

    #[test]
    fn mark_running_requires_pending() {
        let mut db = Database::in_memory().unwrap();
        let now = Utc::now();
        let run = db.create_run(pending("a", now), now).unwrap();
        assert!(db.mark_running(run.id, now).unwrap());
        assert!(!db.mark_running(run.id, now).unwrap());
    }

    #[test]
    fn prune_spares_active_rows() {
        let mut db = Database::in_memory().unwrap();
        let old = Utc::now() - Duration::days(60);
        let now = Utc::now();

        let stale = db.create_run(pending("stale", old), old).unwrap();
        db.mark_running(stale.id, old).unwrap();
        db.finalize(stale.id, RunStatus::Failed, None, Some("boom"), old).unwrap();
        let active = db.create_run(pending("active", old), old).unwrap();
        db.mark_running(active.id, old).unwrap();

        assert_eq!(db.prune_runs(Duration::days(30), now).unwrap(), 1);
        assert!(db.get_run(stale.id).unwrap().is_none());
        assert!(db.get_run(active.id).unwrap().is_some());
    }
}
