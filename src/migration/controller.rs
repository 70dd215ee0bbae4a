use crate::migration::catalog::{StepCatalog, StepDefinition};
use crate::migration::error::{MigrationError, RunOperation};
use crate::migration::executor::{StepExecutor, StepOutcome};
use crate::migration::identity::IdentityProvider;
use crate::migration::notifier::{Notifier, RunEvent, RunEventKind};
use crate::migration::progress::RunProgress;
use crate::migration::retry::RetryPolicy;
use crate::migration::run::{check_run_invariants, Run, RunStatus, StepRecord, StepStatus};
use crate::migration::store::RunStore;
use crate::shared::ids::{ProfileId, RunId};
use crate::shared::logging::RunLogger;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators shared by every controller in a process.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<dyn RunStore>,
    pub catalog: Arc<StepCatalog>,
    pub notifier: Notifier,
    pub executor: Arc<dyn StepExecutor>,
    pub retry: RetryPolicy,
    pub logger: Option<RunLogger>,
}

impl RunContext {
    pub fn new(
        store: Arc<dyn RunStore>,
        catalog: Arc<StepCatalog>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier: Notifier::new(),
            executor,
            retry: RetryPolicy::default(),
            logger: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRun {
    pub profile: ProfileId,
    pub site_url: Option<String>,
    /// Generated when absent.
    pub run_id: Option<RunId>,
}

impl NewRun {
    pub fn for_profile(profile: ProfileId) -> Self {
        Self {
            profile,
            site_url: None,
            run_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The run is not running; nothing happened.
    Idle,
    Progressed { order: u32, progress: u8 },
    StepCompleted { order: u32, next_order: u32 },
    RunCompleted,
    StepFailed { order: u32 },
}

/// Owns one run and its step records. Every mutation is persisted before it
/// becomes visible in memory or to subscribers.
pub struct RunController {
    context: RunContext,
    run: Run,
    steps: Vec<StepRecord>,
    /// Executor answer for the active step whose save failed. Replayed by the
    /// next tick so the work behind it is not redone.
    unsaved_outcome: Option<(usize, StepOutcome)>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("run", &self.run)
            .field("steps", &self.steps)
            .field("unsaved_outcome", &self.unsaved_outcome)
            .finish()
    }
}

impl RunController {
    pub fn create(
        context: RunContext,
        identity: &dyn IdentityProvider,
        request: NewRun,
        now: i64,
    ) -> Result<Self, MigrationError> {
        let actor = identity
            .current_actor()
            .ok_or(MigrationError::Unauthenticated)?;
        let run_id = match request.run_id {
            Some(run_id) => run_id,
            None => RunId::generate(now).map_err(MigrationError::Driver)?,
        };
        let run = Run {
            id: run_id,
            profile: request.profile,
            status: RunStatus::Created,
            owner_id: actor.id,
            site_url: request.site_url,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut controller = Self {
            context,
            run: run.clone(),
            steps: Vec::new(),
            unsaved_outcome: None,
        };
        controller.commit(run, Vec::new(), &[], Vec::new())?;
        controller.log_info(
            "run.created",
            &format!(
                "profile={} owner={}",
                controller.run.profile, controller.run.owner_id
            ),
        );
        Ok(controller)
    }

    /// Reloads a run from the store. A run left `running` by a process that is
    /// gone is suspended in place as `paused` so `resume` continues it.
    pub fn recover(context: RunContext, run_id: &RunId, now: i64) -> Result<Self, MigrationError> {
        let run = context
            .store
            .load_run(run_id)
            .map_err(|source| MigrationError::Persistence {
                run_id: run_id.to_string(),
                attempts: 1,
                source,
            })?
            .ok_or_else(|| MigrationError::UnknownRun {
                run_id: run_id.to_string(),
            })?;
        let steps = context
            .store
            .load_steps(run_id)
            .map_err(|source| MigrationError::Persistence {
                run_id: run_id.to_string(),
                attempts: 1,
                source,
            })?;
        check_run_invariants(&run, &steps).map_err(|reason| MigrationError::CorruptRun {
            run_id: run_id.to_string(),
            reason,
        })?;
        if run.status != RunStatus::Created && !run.status.is_terminal() {
            let definitions = context.catalog.steps(&run.profile)?;
            if definitions.len() != steps.len() {
                return Err(MigrationError::CorruptRun {
                    run_id: run_id.to_string(),
                    reason: format!(
                        "profile `{}` has {} steps but the run has {} records",
                        run.profile,
                        definitions.len(),
                        steps.len()
                    ),
                });
            }
        }

        let mut controller = Self {
            context,
            run,
            steps,
            unsaved_outcome: None,
        };
        if controller.run.status == RunStatus::Running {
            controller.suspend(now, "suspended during recovery")?;
            controller.log_info("run.recovered", "interrupted run suspended as paused");
        }
        Ok(controller)
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn active_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|step| step.is_active())
    }

    pub fn progress(&self) -> RunProgress {
        RunProgress::from_records(&self.run, &self.steps)
    }

    /// Wait before the next quantum of the active step, scaled by `time_scale`.
    pub fn tick_interval(&self, time_scale: f64) -> Option<Duration> {
        let step = self.active_step()?;
        let definition = self
            .context
            .catalog
            .definition(&self.run.profile, step.order)?;
        Some(scale_duration(definition.quantum_interval(), time_scale))
    }

    pub fn start(&mut self, now: i64) -> Result<(), MigrationError> {
        self.require_status(RunOperation::Start, &[RunStatus::Created])?;
        let definitions = self.context.catalog.steps(&self.run.profile)?;

        let mut steps = definitions
            .iter()
            .map(|definition| StepRecord::pending(&self.run.id, definition))
            .collect::<Vec<_>>();
        let mut run = self.run.clone();
        run.status = RunStatus::Running;
        run.updated_at = now;
        start_step(&mut steps[0], now);

        let changed = (0..steps.len()).collect::<Vec<_>>();
        self.commit(
            run,
            steps,
            &changed,
            vec![
                (RunEventKind::RunStatusChanged, None),
                (RunEventKind::StepStatusChanged, Some(0)),
            ],
        )?;
        self.log_info(
            "run.started",
            &format!("{} steps; first `{}`", self.steps.len(), self.steps[0].step_name),
        );
        Ok(())
    }

    pub fn pause(&mut self, now: i64) -> Result<(), MigrationError> {
        self.require_status(RunOperation::Pause, &[RunStatus::Running])?;
        self.suspend(now, "paused")?;
        self.log_info("run.paused", &self.progress().summary);
        Ok(())
    }

    pub fn resume(&mut self, now: i64) -> Result<(), MigrationError> {
        self.require_status(RunOperation::Resume, &[RunStatus::Paused])?;
        let idx = self.active_index()?;
        let mut run = self.run.clone();
        let mut steps = self.steps.clone();
        run.status = RunStatus::Running;
        run.updated_at = now;
        let step = &mut steps[idx];
        step.status = StepStatus::Running;
        let message = format!("resumed at {}%", step.progress);
        step.push_log(now, message);

        self.commit(
            run,
            steps,
            &[idx],
            vec![
                (RunEventKind::StepStatusChanged, Some(idx)),
                (RunEventKind::RunStatusChanged, None),
            ],
        )?;
        self.log_info("run.resumed", &self.progress().summary);
        Ok(())
    }

    pub fn cancel(&mut self, now: i64) -> Result<(), MigrationError> {
        self.require_status(
            RunOperation::Cancel,
            &[RunStatus::Running, RunStatus::Paused],
        )?;
        let idx = self.active_index()?;
        let mut run = self.run.clone();
        let mut steps = self.steps.clone();
        run.status = RunStatus::Cancelled;
        run.updated_at = now;
        let step = &mut steps[idx];
        step.status = StepStatus::Cancelled;
        step.ended_at = Some(now);
        step.push_log(now, "cancelled");

        self.commit(
            run,
            steps,
            &[idx],
            vec![
                (RunEventKind::StepStatusChanged, Some(idx)),
                (RunEventKind::RunStatusChanged, None),
            ],
        )?;
        self.unsaved_outcome = None;
        self.log_info("run.cancelled", &self.progress().summary);
        Ok(())
    }

    /// Advances the active step by one quantum. Does nothing unless the run
    /// is `running`.
    pub fn tick(&mut self, now: i64) -> Result<TickOutcome, MigrationError> {
        if self.run.status != RunStatus::Running {
            return Ok(TickOutcome::Idle);
        }
        let idx = self.active_index()?;
        let definition = self.definition_for(idx)?;
        let outcome = match self.unsaved_outcome.take() {
            Some((pending, outcome)) if pending == idx => outcome,
            _ => self
                .context
                .executor
                .execute(&self.run.id, &definition, self.steps[idx].progress),
        };
        self.unsaved_outcome = Some((idx, outcome.clone()));

        let mut run = self.run.clone();
        let mut steps = self.steps.clone();
        run.updated_at = now;
        let mut events = Vec::new();
        let mut changed = vec![idx];

        let result = match outcome {
            StepOutcome::Advanced => {
                let step = &mut steps[idx];
                step.progress = step.progress.saturating_add(1).min(100);
                if step.progress < 100 {
                    events.push((RunEventKind::StepProgressed, Some(idx)));
                    TickOutcome::Progressed {
                        order: step.order,
                        progress: step.progress,
                    }
                } else {
                    step.status = StepStatus::Completed;
                    step.ended_at = Some(now);
                    step.push_log(now, "completed");
                    let order = step.order;
                    events.push((RunEventKind::StepStatusChanged, Some(idx)));

                    match steps.get_mut(idx + 1) {
                        Some(next) => {
                            start_step(next, now);
                            let next_order = next.order;
                            changed.push(idx + 1);
                            events.push((RunEventKind::StepStatusChanged, Some(idx + 1)));
                            TickOutcome::StepCompleted { order, next_order }
                        }
                        None => {
                            run.status = RunStatus::Completed;
                            run.completed_at = Some(now);
                            events.push((RunEventKind::RunStatusChanged, None));
                            TickOutcome::RunCompleted
                        }
                    }
                }
            }
            StepOutcome::Failed { reason } => {
                let step = &mut steps[idx];
                step.status = StepStatus::Failed;
                step.ended_at = Some(now);
                step.failure_reason = Some(reason);
                step.push_log(now, "failed");
                run.status = RunStatus::Failed;
                events.push((RunEventKind::StepStatusChanged, Some(idx)));
                events.push((RunEventKind::RunStatusChanged, None));
                TickOutcome::StepFailed { order: step.order }
            }
        };

        self.commit(run, steps, &changed, events)?;
        self.unsaved_outcome = None;
        match result {
            TickOutcome::StepCompleted { order, next_order } => self.log_info(
                "step.completed",
                &format!("step {order} completed; step {next_order} started"),
            ),
            TickOutcome::RunCompleted => self.log_info("run.completed", "all steps completed"),
            TickOutcome::StepFailed { order } => {
                let reason = self.steps[idx].failure_reason.clone().unwrap_or_default();
                self.log_error("step.failed", &format!("step {order} failed: {reason}"));
            }
            TickOutcome::Idle | TickOutcome::Progressed { .. } => {}
        }
        Ok(result)
    }

    fn suspend(&mut self, now: i64, message: &str) -> Result<(), MigrationError> {
        let idx = self.active_index()?;
        let mut run = self.run.clone();
        let mut steps = self.steps.clone();
        run.status = RunStatus::Paused;
        run.updated_at = now;
        let step = &mut steps[idx];
        step.status = StepStatus::Paused;
        let message = format!("{message} at {}%", step.progress);
        step.push_log(now, message);

        self.commit(
            run,
            steps,
            &[idx],
            vec![
                (RunEventKind::StepStatusChanged, Some(idx)),
                (RunEventKind::RunStatusChanged, None),
            ],
        )
    }

    fn require_status(
        &self,
        operation: RunOperation,
        allowed: &[RunStatus],
    ) -> Result<(), MigrationError> {
        if allowed.contains(&self.run.status) {
            return Ok(());
        }
        Err(MigrationError::InvalidState {
            run_id: self.run.id.to_string(),
            operation,
            status: self.run.status,
        })
    }

    fn active_index(&self) -> Result<usize, MigrationError> {
        self.steps
            .iter()
            .position(StepRecord::is_active)
            .ok_or_else(|| MigrationError::CorruptRun {
                run_id: self.run.id.to_string(),
                reason: format!("run is `{}` but no step is active", self.run.status),
            })
    }

    fn definition_for(&self, idx: usize) -> Result<StepDefinition, MigrationError> {
        let order = self.steps[idx].order;
        self.context
            .catalog
            .definition(&self.run.profile, order)
            .cloned()
            .ok_or_else(|| MigrationError::CorruptRun {
                run_id: self.run.id.to_string(),
                reason: format!(
                    "profile `{}` has no step with order {order}",
                    self.run.profile
                ),
            })
    }

    /// Persists `run` plus the `changed` step rows, then swaps them in and
    /// publishes `events`. On failure nothing in memory changes.
    fn commit(
        &mut self,
        run: Run,
        steps: Vec<StepRecord>,
        changed: &[usize],
        events: Vec<(RunEventKind, Option<usize>)>,
    ) -> Result<(), MigrationError> {
        self.check_transitions(&run, &steps, changed)?;
        let rows = changed
            .iter()
            .map(|idx| steps[*idx].clone())
            .collect::<Vec<_>>();
        let store = Arc::clone(&self.context.store);
        let logger = self.context.logger.clone();
        let run_id = run.id.to_string();
        self.context
            .retry
            .run(
                || store.save(&run, &rows),
                |attempt, err| {
                    if let Some(logger) = &logger {
                        logger.warn(
                            "persist.retry",
                            Some(&run_id),
                            &format!("attempt {attempt} failed: {err}"),
                        );
                    }
                },
            )
            .map_err(|(attempts, source)| {
                if let Some(logger) = &logger {
                    logger.error(
                        "persist.failed",
                        Some(&run_id),
                        &format!("giving up after {attempts} attempt(s): {source}"),
                    );
                }
                MigrationError::Persistence {
                    run_id: run_id.clone(),
                    attempts,
                    source,
                }
            })?;

        self.run = run;
        self.steps = steps;
        for (kind, idx) in events {
            self.context.notifier.publish(&RunEvent {
                kind,
                run: self.run.clone(),
                step: idx.map(|idx| self.steps[idx].clone()),
            });
        }
        Ok(())
    }

    fn check_transitions(
        &self,
        run: &Run,
        steps: &[StepRecord],
        changed: &[usize],
    ) -> Result<(), MigrationError> {
        let from = self.run.status;
        if run.status != from && !from.can_transition_to(run.status) {
            return Err(MigrationError::CorruptRun {
                run_id: self.run.id.to_string(),
                reason: format!("illegal run transition `{from}` -> `{}`", run.status),
            });
        }
        for idx in changed {
            // Rows created by `start` have no previous state.
            let Some(before) = self.steps.get(*idx) else {
                continue;
            };
            let after = &steps[*idx];
            if after.status != before.status && !before.status.can_transition_to(after.status) {
                return Err(MigrationError::CorruptRun {
                    run_id: self.run.id.to_string(),
                    reason: format!(
                        "illegal transition `{}` -> `{}` for step `{}`",
                        before.status, after.status, after.id
                    ),
                });
            }
        }
        Ok(())
    }

    fn log_info(&self, event: &str, message: &str) {
        if let Some(logger) = &self.context.logger {
            logger.info(event, Some(self.run.id.as_str()), message);
        }
    }

    fn log_error(&self, event: &str, message: &str) {
        if let Some(logger) = &self.context.logger {
            logger.error(event, Some(self.run.id.as_str()), message);
        }
    }
}

fn start_step(step: &mut StepRecord, now: i64) {
    step.status = StepStatus::Running;
    step.started_at = Some(now);
    step.push_log(now, "started");
}

fn scale_duration(duration: Duration, time_scale: f64) -> Duration {
    if !time_scale.is_finite() || time_scale <= 0.0 {
        return duration;
    }
    Duration::try_from_secs_f64(duration.as_secs_f64() * time_scale).unwrap_or(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_duration_multiplies_and_ignores_invalid_scales() {
        let base = Duration::from_secs(3);
        assert_eq!(scale_duration(base, 0.5), Duration::from_millis(1500));
        assert_eq!(scale_duration(base, 0.0), base);
        assert_eq!(scale_duration(base, f64::NAN), base);
    }
}
