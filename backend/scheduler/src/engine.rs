//! The dispatcher: a fixed-cadence tick loop that selects due schedules,
//! admits them through the concurrency guard, and hands dispatch to the run
//! orchestrator. Completions arrive on an mpsc channel so the loop never
//! blocks on run execution.
//!
//! `tick` and `handle_completion` take an explicit `now`, which keeps every
//! scheduling decision a deterministic function of the store — the loop in
//! `run` just feeds them wall-clock time.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use runforge_config::EngineConfig;
use runforge_core::{CompletionEvent, Executor, Notifier, Run, RunStatus, Schedule, ScheduleSpec};

use crate::calculator;
use crate::guard::{self, Admission};
use crate::orchestrator::RunOrchestrator;
use crate::run_store::NewRun;
use crate::store::Database;

pub struct Engine {
    db: Database,
    orchestrator: RunOrchestrator,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        db: Database,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            orchestrator: RunOrchestrator::new(executor, notifier),
            config,
        }
    }

    /// Open the database named by the config and build an engine on it.
    pub fn from_config(
        config: EngineConfig,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        Ok(Self::new(db, executor, notifier, config))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    /// Main loop: tick on a fixed cadence, apply completions as they arrive.
    /// Exactly one engine instance may run against a given store.
    pub async fn run(mut self, mut completion_rx: mpsc::Receiver<CompletionEvent>) -> Result<()> {
        let tick_secs = self.config.tick_interval_secs.max(1);
        info!(tick_secs, "Schedule engine started");

        let mut ticker = time::interval(std::time::Duration::from_secs(tick_secs));
        let mut last_prune = Utc::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    self.tick(now).await;

                    if now - last_prune > Duration::hours(1) {
                        last_prune = now;
                        let max_age = Duration::days(self.config.run_retention_days as i64);
                        match self.db.prune_runs(max_age, now) {
                            Ok(0) => {}
                            Ok(n) => info!(pruned = n, "Pruned old run history"),
                            Err(e) => error!(error = %e, "Failed to prune run history"),
                        }
                    }
                }
                event = completion_rx.recv() => match event {
                    Some(event) => self.handle_completion(event, Utc::now()).await,
                    None => {
                        info!("Completion channel closed, engine shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// One dispatcher pass at `now`. Never raises to the caller: every
    /// failure is logged and recorded as run rows.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        if let Err(e) = self.sweep_timeouts(now).await {
            error!(error = %e, "Timeout sweep failed");
        }
        if let Err(e) = self.dispatch_due(now).await {
            error!(error = %e, "Dispatch pass failed");
        }
        if let Err(e) = self.evaluate_schedules(now).await {
            error!(error = %e, "Schedule evaluation failed");
        }
    }

    pub async fn handle_completion(&mut self, event: CompletionEvent, now: DateTime<Utc>) {
        if let Err(e) = self.orchestrator.handle_completion(&mut self.db, event, now).await {
            error!(error = %e, "Failed to apply completion");
        }
    }

    /// Queue an on-demand run; it is picked up by the normal dispatch path
    /// on the next tick.
    pub async fn submit_run(
        &mut self,
        action_id: &str,
        inputs: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Run> {
        let run = self.db.create_run(
            NewRun {
                action_id,
                schedule_id: None,
                status: RunStatus::Pending,
                attempt_number: 1,
                timeout_seconds: self.config.default_timeout_seconds,
                inputs,
                not_before: now,
            },
            now,
        )?;
        info!(run = run.numbered_id, action = %action_id, "Queued on-demand run");
        Ok(run)
    }

    /// Cancel a pending or running run. Returns false if it was already
    /// terminal.
    pub async fn cancel_run(&mut self, run_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let Some(run) = self.db.get_run(run_id)? else {
            return Ok(false);
        };
        self.orchestrator.cancel(&mut self.db, &run, now).await
    }

    /// Force `running` rows past their deadline into `timeout`, freeing
    /// their concurrency slots before the dispatch passes below.
    async fn sweep_timeouts(&mut self, now: DateTime<Utc>) -> Result<()> {
        for run in self.db.running_past_deadline(now)? {
            self.orchestrator.force_timeout(&mut self.db, &run, now).await?;
        }
        Ok(())
    }

    /// Dispatch due pending rows (held occurrences, retries, on-demand
    /// submissions) oldest first.
    async fn dispatch_due(&mut self, now: DateTime<Utc>) -> Result<()> {
        for run in self.db.due_pending(now)? {
            let Some(schedule_id) = run.schedule_id else {
                self.orchestrator.dispatch(&mut self.db, &run, now).await?;
                continue;
            };
            let Some(schedule) = self.db.get_schedule(schedule_id)? else {
                warn!(
                    run = run.numbered_id,
                    schedule_id = %schedule_id,
                    "Schedule deleted; cancelling pending run"
                );
                self.db
                    .finalize(run.id, RunStatus::Cancelled, None, Some("schedule deleted"), now)?;
                continue;
            };
            match guard::admit(&self.db, &schedule)? {
                Admission::Dispatch => {
                    self.orchestrator.dispatch(&mut self.db, &run, now).await?;
                }
                // An already-recorded row waits for a slot; skip applies
                // only when an occurrence is first recorded.
                Admission::Hold | Admission::Skip => {
                    debug!(run = run.numbered_id, "Concurrency saturated; run stays pending");
                }
            }
        }
        Ok(())
    }

    /// Fire due schedules, at most one occurrence per schedule per tick
    /// (catch-up-by-one), in creation order.
    async fn evaluate_schedules(&mut self, now: DateTime<Utc>) -> Result<()> {
        for schedule in self.db.list_enabled()? {
            let reference = schedule.last_fired_at.unwrap_or(schedule.created_at);
            let Some(due_at) = calculator::next_fire(&schedule, reference) else {
                continue;
            };
            if due_at > now {
                continue;
            }

            let last_fired_at = calculator::advance_last_fired(&schedule, due_at, now);
            let disable = matches!(schedule.spec, ScheduleSpec::Once { .. });
            let admission = guard::admit(&self.db, &schedule)?;
            let status = match admission {
                Admission::Skip => RunStatus::Skipped,
                Admission::Dispatch | Admission::Hold => RunStatus::Pending,
            };

            let run = self.fire(&schedule, status, due_at, last_fired_at, disable, now)?;
            match admission {
                Admission::Dispatch => {
                    self.orchestrator.dispatch(&mut self.db, &run, now).await?;
                }
                Admission::Skip => {
                    info!(
                        run = run.numbered_id,
                        schedule = %schedule.name,
                        "Occurrence skipped: concurrency limit reached"
                    );
                }
                Admission::Hold => {
                    info!(
                        run = run.numbered_id,
                        schedule = %schedule.name,
                        "Occurrence held: concurrency limit reached"
                    );
                }
            }
        }
        Ok(())
    }

    fn fire(
        &mut self,
        schedule: &Schedule,
        status: RunStatus,
        due_at: DateTime<Utc>,
        last_fired_at: DateTime<Utc>,
        disable: bool,
        now: DateTime<Utc>,
    ) -> Result<Run> {
        let inputs = json!({
            "trigger": "schedule",
            "schedule": schedule.name,
            "fired_at": due_at.to_rfc3339(),
        });
        let run = self.db.create_occurrence(
            NewRun {
                action_id: &schedule.action_id,
                schedule_id: Some(schedule.id),
                status,
                attempt_number: 1,
                timeout_seconds: schedule.timeout_seconds,
                inputs,
                not_before: now,
            },
            last_fired_at,
            disable,
            now,
        )?;
        debug!(
            run = run.numbered_id,
            schedule = %schedule.name,
            due_at = %due_at,
            "Schedule fired"
        );
        Ok(run)
    }
}
