//! Retry decisions for failed and timed-out runs.
//!
//! A pending retry is an ordinary future run row with a `not_before`
//! timestamp, picked up by the same dispatch path as schedule occurrences;
//! there is no separate retry timer to lose across a restart.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use runforge_core::{Notifier, Run, RunStatus};

use crate::run_store::NewRun;
use crate::store::Database;

pub struct RetryManager {
    notifier: Arc<dyn Notifier>,
}

impl RetryManager {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Interpret a failure signal for `run`, which has just been finalized
    /// as failed or timed out. The sole interpreter of failure signals:
    /// nothing else decides whether another attempt happens.
    pub async fn on_failure(
        &self,
        db: &mut Database,
        run: &Run,
        error: &str,
        fatal: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(schedule_id) = run.schedule_id else {
            debug!(run = run.numbered_id, "On-demand run failed; no retry policy");
            return Ok(());
        };
        let Some(schedule) = db.get_schedule(schedule_id)? else {
            warn!(
                run = run.numbered_id,
                schedule_id = %schedule_id,
                "Schedule deleted; not retrying"
            );
            return Ok(());
        };

        if schedule.notify_on_failure {
            // Fire-and-forget: the engine never waits on delivery.
            let notifier = Arc::clone(&self.notifier);
            let (run_id, error_message) = (run.id, error.to_string());
            tokio::spawn(async move {
                notifier.notify(run_id, Some(schedule_id), &error_message).await;
            });
        }

        if fatal {
            info!(
                run = run.numbered_id,
                schedule = %schedule.name,
                "Fatal executor error; not retrying"
            );
            return Ok(());
        }
        if !schedule.retry_enabled {
            return Ok(());
        }
        if run.attempt_number > schedule.retry_max_attempts {
            warn!(
                run = run.numbered_id,
                attempt = run.attempt_number,
                max_attempts = schedule.retry_max_attempts,
                schedule = %schedule.name,
                "Retry attempts exhausted"
            );
            return Ok(());
        }

        let not_before = now + Duration::seconds(schedule.retry_delay_seconds as i64);
        let retry = db.create_run(
            NewRun {
                action_id: &run.action_id,
                schedule_id: Some(schedule_id),
                status: RunStatus::Pending,
                attempt_number: run.attempt_number + 1,
                timeout_seconds: run.timeout_seconds,
                inputs: run.inputs.clone(),
                not_before,
            },
            now,
        )?;
        info!(
            run = retry.numbered_id,
            attempt = retry.attempt_number,
            delay_secs = schedule.retry_delay_seconds,
            schedule = %schedule.name,
            "Scheduled retry attempt"
        );
        Ok(())
    }
}
