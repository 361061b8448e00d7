//! Run state machine.
//!
//! ```text
//! pending --dispatch--> running --success/failed/timeout--> terminal
//! failed/timeout --retry eligible--> new pending row (attempt+1)
//! ```
//!
//! Every transition is a single-row transactional write; terminal rows are
//! immutable, so a late completion after a forced timeout can only be
//! logged, never applied.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use runforge_core::{CompletionEvent, ExecuteRequest, Executor, Notifier, Run, RunStatus};

use crate::retry::RetryManager;
use crate::store::Database;

pub struct RunOrchestrator {
    executor: Arc<dyn Executor>,
    retry: RetryManager,
}

impl RunOrchestrator {
    pub fn new(executor: Arc<dyn Executor>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            executor,
            retry: RetryManager::new(notifier),
        }
    }

    /// pending → running, then hand the invocation to the Executor. A
    /// rejected acknowledgment fails the run immediately (fatal rejections
    /// skip the retry path).
    pub async fn dispatch(&self, db: &mut Database, run: &Run, now: DateTime<Utc>) -> Result<()> {
        if !db.mark_running(run.id, now)? {
            warn!(run = run.numbered_id, "Dispatch raced a concurrent transition; skipping");
            return Ok(());
        }
        info!(
            run = run.numbered_id,
            action = %run.action_id,
            attempt = run.attempt_number,
            "Dispatching run"
        );

        let request = ExecuteRequest {
            run_id: run.id,
            numbered_id: run.numbered_id,
            action_id: run.action_id.clone(),
            inputs: run.inputs.clone(),
            timeout_seconds: run.timeout_seconds,
        };
        if let Err(failure) = self.executor.execute(request).await {
            warn!(
                run = run.numbered_id,
                error = %failure.message(),
                "Executor rejected invocation"
            );
            db.finalize(run.id, RunStatus::Failed, None, Some(failure.message()), now)?;
            self.retry
                .on_failure(db, run, failure.message(), failure.is_fatal(), now)
                .await?;
        }
        Ok(())
    }

    /// Apply a completion posted by the Executor.
    pub async fn handle_completion(
        &self,
        db: &mut Database,
        event: CompletionEvent,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(run) = db.get_run(event.run_id)? else {
            warn!(run_id = %event.run_id, "Completion for unknown run; ignoring");
            return Ok(());
        };
        if run.status != RunStatus::Running {
            // Late completion after a forced timeout, or a duplicate signal.
            warn!(
                run = run.numbered_id,
                status = %run.status,
                "Completion for non-running run; ignoring"
            );
            return Ok(());
        }

        match event.outcome {
            Ok(result) => {
                db.finalize(run.id, RunStatus::Success, Some(&result), None, now)?;
                info!(run = run.numbered_id, "Run completed");
            }
            Err(failure) => {
                db.finalize(run.id, RunStatus::Failed, None, Some(failure.message()), now)?;
                warn!(
                    run = run.numbered_id,
                    error = %failure.message(),
                    "Run failed"
                );
                self.retry
                    .on_failure(db, &run, failure.message(), failure.is_fatal(), now)
                    .await?;
            }
        }
        Ok(())
    }

    /// Force a deadline-exceeded run into `timeout`. Cancellation is
    /// best-effort and non-blocking: the row is finalized without waiting
    /// for the Executor to actually stop.
    pub async fn force_timeout(&self, db: &mut Database, run: &Run, now: DateTime<Utc>) -> Result<()> {
        let message = format!("no completion within {}s", run.timeout_seconds);
        db.finalize(run.id, RunStatus::Timeout, None, Some(&message), now)?;
        warn!(
            run = run.numbered_id,
            timeout_secs = run.timeout_seconds,
            "Run timed out"
        );

        let executor = Arc::clone(&self.executor);
        let run_id = run.id;
        tokio::spawn(async move {
            executor.cancel(run_id).await;
        });

        // Timeouts are retryable failures.
        self.retry.on_failure(db, run, &message, false, now).await?;
        Ok(())
    }

    /// Management-initiated cancellation of a pending or running run.
    pub async fn cancel(&self, db: &mut Database, run: &Run, now: DateTime<Utc>) -> Result<bool> {
        let cancelled = db.finalize(run.id, RunStatus::Cancelled, None, Some("cancelled"), now)?;
        if cancelled && run.status == RunStatus::Running {
            let executor = Arc::clone(&self.executor);
            let run_id = run.id;
            tokio::spawn(async move {
                executor.cancel(run_id).await;
            });
        }
        Ok(cancelled)
    }
}
