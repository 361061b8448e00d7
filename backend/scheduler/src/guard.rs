//! Concurrency admission.
//!
//! The running count is a derived query against the run store, so a crash
//! and restart reconstruct the same admission decisions from persisted rows.

use anyhow::Result;

use runforge_core::Schedule;

use crate::store::Database;

/// What to do with a due occurrence (or a dispatchable pending row).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot is free: dispatch now.
    Dispatch,
    /// Saturated, `skip_if_running = false`: keep the row pending until a
    /// slot frees.
    Hold,
    /// Saturated, `skip_if_running = true`: record a skipped row, no
    /// executor call.
    Skip,
}

pub fn admit(db: &Database, schedule: &Schedule) -> Result<Admission> {
    let running = db.count_running(schedule.id)?;
    if running < schedule.max_concurrent {
        Ok(Admission::Dispatch)
    } else if schedule.skip_if_running {
        Ok(Admission::Skip)
    } else {
        Ok(Admission::Hold)
    }
}
