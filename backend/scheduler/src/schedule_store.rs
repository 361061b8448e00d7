//! Schedule CRUD.
//!
//! Consumed by the external management API; the engine itself only reads
//! enabled schedules and writes `last_fired_at` (inside the fire
//! transaction, see `run_store.rs`).

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use runforge_core::Schedule;

use crate::store::{from_millis, to_millis, Database};
use crate::validation::validate_schedule;

const SCHEDULE_COLUMNS: &str = "id, name, description, action_id, spec, timezone, enabled, \
     skip_if_running, max_concurrent, timeout_seconds, retry_enabled, retry_max_attempts, \
     retry_delay_seconds, notify_on_failure, last_fired_at, created_at";

type ScheduleRow = (
    String,         // id
    String,         // name
    String,         // description
    String,         // action_id
    String,         // spec (JSON)
    String,         // timezone
    i64,            // enabled
    i64,            // skip_if_running
    i64,            // max_concurrent
    i64,            // timeout_seconds
    i64,            // retry_enabled
    i64,            // retry_max_attempts
    i64,            // retry_delay_seconds
    i64,            // notify_on_failure
    Option<i64>,    // last_fired_at
    i64,            // created_at
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRow> {
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
        row.get(15)?,
    ))
}

fn parse_schedule(raw: ScheduleRow) -> Option<Schedule> {
    Some(Schedule {
        id: Uuid::parse_str(&raw.0).ok()?,
        name: raw.1,
        description: raw.2,
        action_id: raw.3,
        spec: serde_json::from_str(&raw.4).ok()?,
        timezone: raw.5,
        enabled: raw.6 != 0,
        skip_if_running: raw.7 != 0,
        max_concurrent: raw.8 as u32,
        timeout_seconds: raw.9 as u64,
        retry_enabled: raw.10 != 0,
        retry_max_attempts: raw.11 as u32,
        retry_delay_seconds: raw.12 as u64,
        notify_on_failure: raw.13 != 0,
        last_fired_at: raw.14.map(from_millis),
        created_at: from_millis(raw.15),
    })
}

impl Database {
    /// Persist a new schedule. Malformed definitions are rejected here and
    /// never reach the engine.
    pub fn create_schedule(&self, schedule: &Schedule) -> Result<()> {
        validate_schedule(schedule)?;
        self.conn.execute(
            &format!(
                "INSERT INTO schedules ({SCHEDULE_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)"
            ),
            params![
                schedule.id.to_string(),
                schedule.name,
                schedule.description,
                schedule.action_id,
                serde_json::to_string(&schedule.spec)?,
                schedule.timezone,
                schedule.enabled as i64,
                schedule.skip_if_running as i64,
                schedule.max_concurrent as i64,
                schedule.timeout_seconds as i64,
                schedule.retry_enabled as i64,
                schedule.retry_max_attempts as i64,
                schedule.retry_delay_seconds as i64,
                schedule.notify_on_failure as i64,
                schedule.last_fired_at.map(to_millis),
                to_millis(schedule.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"
        ))?;
        let schedule = stmt
            .query_map(params![id.to_string()], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_schedule)
            .next();
        Ok(schedule)
    }

    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY created_at ASC, id ASC"
        ))?;
        let schedules = stmt
            .query_map([], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_schedule)
            .collect();
        Ok(schedules)
    }

    /// Enabled schedules in creation order, which is the deterministic order
    /// the dispatcher processes them in.
    pub fn list_enabled(&self) -> Result<Vec<Schedule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE enabled = 1
             ORDER BY created_at ASC, id ASC"
        ))?;
        let schedules = stmt
            .query_map([], read_row)?
            .filter_map(|r| r.ok())
            .filter_map(parse_schedule)
            .collect();
        Ok(schedules)
    }

    /// Update management-owned fields. `last_fired_at` and `created_at` are
    /// deliberately untouched; only the engine writes the former.
    pub fn update_schedule(&self, schedule: &Schedule) -> Result<()> {
        validate_schedule(schedule)?;
        self.conn.execute(
            "UPDATE schedules SET
                name = ?2, description = ?3, action_id = ?4, spec = ?5, timezone = ?6,
                enabled = ?7, skip_if_running = ?8, max_concurrent = ?9,
                timeout_seconds = ?10, retry_enabled = ?11, retry_max_attempts = ?12,
                retry_delay_seconds = ?13, notify_on_failure = ?14
             WHERE id = ?1",
            params![
                schedule.id.to_string(),
                schedule.name,
                schedule.description,
                schedule.action_id,
                serde_json::to_string(&schedule.spec)?,
                schedule.timezone,
                schedule.enabled as i64,
                schedule.skip_if_running as i64,
                schedule.max_concurrent as i64,
                schedule.timeout_seconds as i64,
                schedule.retry_enabled as i64,
                schedule.retry_max_attempts as i64,
                schedule.retry_delay_seconds as i64,
                schedule.notify_on_failure as i64,
            ],
        )?;
        Ok(())
    }

    pub fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE schedules SET enabled = ?2 WHERE id = ?1",
            params![id.to_string(), enabled as i64],
        )?;
        Ok(())
    }

    pub fn delete_schedule(&self, id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM schedules WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    pub(crate) fn mark_fired_tx(
        tx: &rusqlite::Transaction<'_>,
        id: Uuid,
        last_fired_at: DateTime<Utc>,
        disable: bool,
    ) -> Result<()> {
        tx.execute(
            "UPDATE schedules SET last_fired_at = ?2, enabled = CASE WHEN ?3 THEN 0 ELSE enabled END
             WHERE id = ?1",
            params![id.to_string(), to_millis(last_fired_at), disable],
        )?;
        Ok(())
    }
}
