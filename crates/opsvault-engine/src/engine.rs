//! Recovery orchestrator
//!
//! Executes a validated [`Plan`] phase by phase in dependency order. Each
//! attempt runs under a hard deadline; a phase gets at most `retry_limit`
//! attempts in total. Any phase that does not succeed causes its transitive
//! dependents to be skipped without being attempted; a critical phase
//! additionally runs its rollback command after the budget is exhausted and
//! marks the run unsuccessful. Independent phases keep executing either way.

use crate::action::{ActionOutcome, ActionSet, PhaseAction};
use crate::error::EngineError;
use crate::ledger::{AttemptOutcome, AttemptRecord, Ledger, RunId};
use crate::state::{validate_transition, PhaseState};
use chrono::{DateTime, Utc};
use opsvault_plan::{PhaseSpec, Plan};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Terminal record of one phase within a run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PhaseResult {
    /// Phase id.
    pub id: String,
    /// Terminal lifecycle state.
    pub state: PhaseState,
    /// Attempts consumed. Zero for skipped phases.
    pub attempts: u32,
    /// Diagnostic detail: the last attempt's error, or the skip cause.
    pub error: Option<String>,
}

/// Outcome of a whole recovery run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunResult {
    /// Run id, shared with the ledger rows.
    pub run_id: RunId,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-phase terminal records, in execution order.
    pub phases: Vec<PhaseResult>,
    /// Whether the run was cancelled before every phase was scheduled.
    pub cancelled: bool,
}

impl RunResult {
    /// A run succeeds when every critical phase succeeded.
    #[must_use]
    pub fn success(&self, plan: &Plan) -> bool {
        plan.phases().iter().filter(|p| p.critical).all(|p| {
            self.phases
                .iter()
                .any(|r| r.id == p.id && r.state == PhaseState::Succeeded)
        })
    }

    /// Whether every phase (critical or not) succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.phases.iter().all(|r| r.state == PhaseState::Succeeded)
    }

    /// Phases in a given terminal state.
    #[must_use]
    pub fn in_state(&self, state: PhaseState) -> Vec<&str> {
        self.phases
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.id.as_str())
            .collect()
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Drives a plan to completion against an [`ActionSet`], recording every
/// attempt in the [`Ledger`].
pub struct Orchestrator {
    plan: Plan,
    actions: ActionSet,
    ledger: Ledger,
    cancel: Arc<AtomicBool>,
    validate_only: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phases", &self.plan.len())
            .field("validate_only", &self.validate_only)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator over a validated plan.
    #[must_use]
    pub fn new(plan: Plan, actions: ActionSet, ledger: Ledger) -> Self {
        Self {
            plan,
            actions,
            ledger,
            cancel: Arc::new(AtomicBool::new(false)),
            validate_only: false,
        }
    }

    /// Run only each phase's validation probe, skipping run and rollback
    /// commands. Used to check a recovered system without mutating it.
    #[inline]
    #[must_use]
    pub fn validate_only(mut self, enabled: bool) -> Self {
        self.validate_only = enabled;
        self
    }

    /// Handle that cancels the run when set. Checked between phases and
    /// between attempts; an in-flight attempt still runs to its deadline.
    #[inline]
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// The plan being executed.
    #[inline]
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// The ledger recording this orchestrator's runs.
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Execute the plan once.
    ///
    /// # Errors
    /// Only infrastructure failures (ledger writes) abort the run; phase
    /// failures are captured in the returned [`RunResult`].
    pub async fn run(&self) -> Result<RunResult, EngineError> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        tracing::info!(run = %run_id, phases = self.plan.len(), "recovery run starting");

        let mut results: Vec<PhaseResult> = Vec::with_capacity(self.plan.len());
        // Dependent phase id -> id of the upstream phase that did not succeed.
        let mut skip: HashMap<String, String> = HashMap::new();
        let mut cancelled = false;

        let ordered: Vec<PhaseSpec> = self.plan.ordered().cloned().collect();
        for spec in &ordered {
            if self.cancel.load(Ordering::SeqCst) {
                cancelled = true;
            }
            let cause = if cancelled {
                Some("run cancelled".to_string())
            } else {
                skip.get(&spec.id)
                    .map(|upstream| format!("dependency {upstream} did not succeed"))
            };
            if let Some(cause) = cause {
                validate_transition(PhaseState::Pending, PhaseState::Skipped)?;
                tracing::warn!(run = %run_id, phase = %spec.id, cause = %cause, "phase skipped");
                results.push(PhaseResult {
                    id: spec.id.clone(),
                    state: PhaseState::Skipped,
                    attempts: 0,
                    error: Some(cause),
                });
                continue;
            }

            let result = self.run_phase(run_id, spec).await?;
            if result.state != PhaseState::Succeeded {
                for dependent in self.plan.dependents_of(&spec.id) {
                    skip.entry(dependent).or_insert_with(|| spec.id.clone());
                }
            }
            results.push(result);
        }

        let run = RunResult {
            run_id,
            started_at,
            finished_at: Utc::now(),
            phases: results,
            cancelled,
        };
        tracing::info!(
            run = %run_id,
            success = run.success(&self.plan),
            cancelled,
            "recovery run finished"
        );
        Ok(run)
    }

    /// Drive one phase through its attempt budget.
    async fn run_phase(&self, run_id: RunId, spec: &PhaseSpec) -> Result<PhaseResult, EngineError> {
        let Some(action) = self.actions.get(&spec.id) else {
            // No registered action means nothing to execute; the phase is a
            // vacuous success so dependents are not blocked, but the result
            // says so rather than passing for real work.
            tracing::warn!(run = %run_id, phase = %spec.id, "no action registered");
            return Ok(PhaseResult {
                id: spec.id.clone(),
                state: PhaseState::Succeeded,
                attempts: 0,
                error: Some("no action registered; nothing executed".to_string()),
            });
        };

        let mut state = PhaseState::Pending;
        let mut last_error = None;

        for attempt_no in 1..=spec.retry_limit {
            validate_transition(state, PhaseState::Running)?;
            state = PhaseState::Running;

            let started = Utc::now();
            tracing::info!(
                run = %run_id,
                phase = %spec.id,
                attempt = attempt_no,
                budget = spec.retry_limit,
                "attempt starting"
            );

            let (mut outcome, mut error) = self.attempt(action.as_ref(), spec).await?;

            // A critical phase's final failed attempt triggers rollback and
            // is recorded with that status. Attempt numbers stay contiguous
            // with exactly one row per attempt.
            let exhausted = attempt_no == spec.retry_limit;
            if outcome != AttemptOutcome::Succeeded
                && exhausted
                && spec.critical
                && !self.validate_only
            {
                let rb_error = self.rollback(action.as_ref(), spec).await?;
                outcome = AttemptOutcome::RolledBack;
                error = match (error, rb_error) {
                    (Some(e), Some(rb)) => Some(format!("{e}; {rb}")),
                    (e, rb) => e.or(rb),
                };
            }

            self.ledger.record(&AttemptRecord {
                run_id,
                phase_id: spec.id.clone(),
                attempt_no,
                outcome,
                started_at: started,
                ended_at: Utc::now(),
                error: error.clone(),
            })?;

            if outcome == AttemptOutcome::Succeeded {
                validate_transition(state, PhaseState::Succeeded)?;
                return Ok(PhaseResult {
                    id: spec.id.clone(),
                    state: PhaseState::Succeeded,
                    attempts: attempt_no,
                    error: None,
                });
            }

            last_error = error;
            tracing::warn!(
                run = %run_id,
                phase = %spec.id,
                attempt = attempt_no,
                outcome = %outcome,
                error = last_error.as_deref().unwrap_or("unknown"),
                "attempt failed"
            );

            if outcome == AttemptOutcome::RolledBack {
                validate_transition(state, PhaseState::RolledBack)?;
                return Ok(PhaseResult {
                    id: spec.id.clone(),
                    state: PhaseState::RolledBack,
                    attempts: attempt_no,
                    error: last_error,
                });
            }

            // Cancellation waits for the in-flight attempt, then stops
            // retrying. No rollback: the phase was interrupted, not
            // exhausted.
            if self.cancel.load(Ordering::SeqCst) && !exhausted {
                validate_transition(state, PhaseState::Failed)?;
                return Ok(PhaseResult {
                    id: spec.id.clone(),
                    state: PhaseState::Failed,
                    attempts: attempt_no,
                    error: last_error,
                });
            }
        }

        // Budget exhausted without success or rollback.
        validate_transition(state, PhaseState::Failed)?;
        Ok(PhaseResult {
            id: spec.id.clone(),
            state: PhaseState::Failed,
            attempts: spec.retry_limit,
            error: last_error,
        })
    }

    /// One attempt: run command, then validation probe, both under the
    /// phase's deadline. Launch failures count as failed attempts rather
    /// than aborting the run.
    async fn attempt(
        &self,
        action: &dyn PhaseAction,
        spec: &PhaseSpec,
    ) -> Result<(AttemptOutcome, Option<String>), EngineError> {
        let work = async {
            if !self.validate_only {
                match action.execute().await {
                    Ok(ActionOutcome::Success) => {}
                    Ok(ActionOutcome::Failure(detail)) => {
                        return Ok::<_, EngineError>((AttemptOutcome::Failed, Some(detail)))
                    }
                    Err(EngineError::Spawn { command, source }) => {
                        return Ok((
                            AttemptOutcome::Failed,
                            Some(format!("{command}: {source}")),
                        ))
                    }
                    Err(other) => return Err(other),
                }
            }
            match action.validate().await {
                Ok(ActionOutcome::Success) => Ok((AttemptOutcome::Succeeded, None)),
                Ok(ActionOutcome::Failure(detail)) => {
                    Ok((AttemptOutcome::Failed, Some(format!("validation failed: {detail}"))))
                }
                Err(EngineError::Spawn { command, source }) => {
                    Ok((AttemptOutcome::Failed, Some(format!("{command}: {source}"))))
                }
                Err(other) => Err(other),
            }
        };

        match tokio::time::timeout(spec.timeout(), work).await {
            Ok(result) => result,
            Err(_) => Ok((
                AttemptOutcome::TimedOut,
                Some(format!("deadline of {:?} exceeded", spec.timeout())),
            )),
        }
    }

    /// Run the rollback command under the phase deadline. A failed rollback
    /// is recorded but does not abort the run.
    async fn rollback(
        &self,
        action: &dyn PhaseAction,
        spec: &PhaseSpec,
    ) -> Result<Option<String>, EngineError> {
        let work = action.rollback();
        match tokio::time::timeout(spec.timeout(), work).await {
            Ok(Ok(ActionOutcome::Success)) => Ok(None),
            Ok(Ok(ActionOutcome::Failure(detail))) => {
                tracing::error!(phase = %spec.id, detail = %detail, "rollback failed");
                Ok(Some(format!("rollback failed: {detail}")))
            }
            Ok(Err(EngineError::Spawn { command, source })) => {
                tracing::error!(phase = %spec.id, command = %command, "rollback unlaunchable");
                Ok(Some(format!("rollback failed: {command}: {source}")))
            }
            Ok(Err(other)) => Err(other),
            Err(_) => Ok(Some("rollback timed out".to_string())),
        }
    }
}
