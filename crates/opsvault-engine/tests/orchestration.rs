//! Orchestrator behavior under failure: retry budgets, rollback, skip
//! propagation, timeouts and cancellation, with the ledger audited after
//! each run.

use async_trait::async_trait;
use opsvault_engine::{
    ActionOutcome, ActionSet, AttemptOutcome, EngineError, Ledger, Orchestrator, PhaseAction,
    PhaseState,
};
use opsvault_plan::{PhaseSpec, Plan};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Succeeds after failing a configured number of times.
struct FlakyAction {
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyAction {
    fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self { failures_left: AtomicU32::new(times), calls: AtomicU32::new(0) })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhaseAction for FlakyAction {
    async fn execute(&self) -> Result<ActionOutcome, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            Ok(ActionOutcome::Failure("not yet".to_string()))
        } else {
            Ok(ActionOutcome::Success)
        }
    }
}

/// Counts rollback invocations; always fails execution.
struct DoomedAction {
    rollbacks: AtomicU32,
}

impl DoomedAction {
    fn new() -> Arc<Self> {
        Arc::new(Self { rollbacks: AtomicU32::new(0) })
    }
}

#[async_trait]
impl PhaseAction for DoomedAction {
    async fn execute(&self) -> Result<ActionOutcome, EngineError> {
        Ok(ActionOutcome::Failure("always fails".to_string()))
    }

    async fn rollback(&self) -> Result<ActionOutcome, EngineError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(ActionOutcome::Success)
    }
}

/// Sleeps past any reasonable deadline.
struct StuckAction;

#[async_trait]
impl PhaseAction for StuckAction {
    async fn execute(&self) -> Result<ActionOutcome, EngineError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ActionOutcome::Success)
    }
}

/// Records that it ran at all.
struct TracerAction {
    calls: AtomicU32,
}

impl TracerAction {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl PhaseAction for TracerAction {
    async fn execute(&self) -> Result<ActionOutcome, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ActionOutcome::Success)
    }
}

fn phase(id: &str, order: u32, deps: &[&str]) -> PhaseSpec {
    PhaseSpec::new(id, order, 60).with_dependencies(deps.iter().copied())
}

#[tokio::test]
async fn retry_limit_is_a_total_attempt_budget() {
    // Limit 3 means exactly three attempts, never a fourth.
    let plan = Plan::validate(vec![phase("db", 1, &[]).with_retry_limit(3)]).unwrap();
    let action = FlakyAction::failing(10);
    let actions = ActionSet::from_plan(&plan).with_action("db", action.clone());
    let orch = Orchestrator::new(plan, actions, Ledger::open_in_memory().unwrap());

    let result = orch.run().await.unwrap();

    assert_eq!(action.calls(), 3);
    assert_eq!(result.phases[0].state, PhaseState::Failed);
    assert_eq!(result.phases[0].attempts, 3);

    let history = orch.ledger().history_for(result.run_id).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|a| a.outcome == AttemptOutcome::Failed));
    assert_eq!(history.iter().map(|a| a.attempt_no).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[tokio::test]
async fn critical_phase_with_limit_three_leaves_exactly_three_rows() {
    let plan =
        Plan::validate(vec![phase("db", 1, &[]).critical().with_retry_limit(3)]).unwrap();
    let actions = ActionSet::from_plan(&plan).with_action("db", DoomedAction::new());
    let orch = Orchestrator::new(plan, actions, Ledger::open_in_memory().unwrap());

    let result = orch.run().await.unwrap();
    assert_eq!(result.phases[0].state, PhaseState::RolledBack);

    let history = orch.ledger().history_for(result.run_id).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().map(|a| a.attempt_no).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(history[0].outcome, AttemptOutcome::Failed);
    assert_eq!(history[1].outcome, AttemptOutcome::Failed);
    assert_eq!(history[2].outcome, AttemptOutcome::RolledBack);
}

#[tokio::test]
async fn succeeds_within_the_budget() {
    let plan = Plan::validate(vec![phase("db", 1, &[]).with_retry_limit(3)]).unwrap();
    let action = FlakyAction::failing(2);
    let actions = ActionSet::from_plan(&plan).with_action("db", action.clone());
    let orch = Orchestrator::new(plan.clone(), actions, Ledger::open_in_memory().unwrap());

    let result = orch.run().await.unwrap();

    assert_eq!(action.calls(), 3);
    assert_eq!(result.phases[0].state, PhaseState::Succeeded);
    assert_eq!(result.phases[0].attempts, 3);
    assert!(result.success(&plan));

    let history = orch.ledger().history_for(result.run_id).unwrap();
    assert_eq!(history.last().unwrap().outcome, AttemptOutcome::Succeeded);
}

#[tokio::test]
async fn critical_failure_rolls_back_and_skips_dependents() {
    let plan = Plan::validate(vec![
        phase("db", 1, &[]).critical().with_retry_limit(2),
        phase("env", 2, &["db"]),
        phase("app", 3, &["env"]),
        phase("side", 4, &[]),
    ])
    .unwrap();
    let doomed = DoomedAction::new();
    let side = TracerAction::new();
    let actions = ActionSet::from_plan(&plan)
        .with_action("db", doomed.clone())
        .with_action("env", TracerAction::new())
        .with_action("app", TracerAction::new())
        .with_action("side", side.clone());
    let orch = Orchestrator::new(plan.clone(), actions, Ledger::open_in_memory().unwrap());

    let result = orch.run().await.unwrap();

    assert_eq!(result.phases[0].state, PhaseState::RolledBack);
    assert_eq!(doomed.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(result.in_state(PhaseState::Skipped), vec!["env", "app"]);
    // Skipped results name the upstream phase that took them down.
    for skipped in result.phases.iter().filter(|p| p.state == PhaseState::Skipped) {
        assert_eq!(skipped.error.as_deref(), Some("dependency db did not succeed"));
    }
    // Independent phases keep running after a critical failure.
    assert_eq!(side.calls.load(Ordering::SeqCst), 1);
    assert!(!result.success(&plan));

    // Skipped phases leave no ledger rows. The db phase has one row per
    // attempt, the final one carrying the rollback status.
    let history = orch.ledger().history_for(result.run_id).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|a| a.phase_id == "db" || a.phase_id == "side"));
    let db_rows: Vec<_> = history.iter().filter(|a| a.phase_id == "db").collect();
    assert_eq!(db_rows.len(), 2);
    assert_eq!(db_rows[0].outcome, AttemptOutcome::Failed);
    assert_eq!(db_rows[1].outcome, AttemptOutcome::RolledBack);
    assert_eq!(db_rows[1].attempt_no, 2);
}

#[tokio::test]
async fn non_critical_failure_skips_dependents_but_not_siblings() {
    let plan = Plan::validate(vec![
        phase("optional", 1, &[]).with_retry_limit(1),
        phase("after", 2, &["optional"]),
        phase("side", 3, &[]),
    ])
    .unwrap();
    let after = TracerAction::new();
    let side = TracerAction::new();
    let actions = ActionSet::from_plan(&plan)
        .with_action("optional", DoomedAction::new())
        .with_action("after", after.clone())
        .with_action("side", side.clone());
    let orch = Orchestrator::new(plan.clone(), actions, Ledger::open_in_memory().unwrap());

    let result = orch.run().await.unwrap();

    // A dependent of a failed phase never runs, critical or not. Phases
    // with satisfied dependencies keep going.
    assert_eq!(result.phases[0].state, PhaseState::Failed);
    assert_eq!(result.phases[1].state, PhaseState::Skipped);
    assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        result.phases[1].error.as_deref(),
        Some("dependency optional did not succeed")
    );
    assert_eq!(result.phases[2].state, PhaseState::Succeeded);
    assert_eq!(side.calls.load(Ordering::SeqCst), 1);
    assert!(result.success(&plan));
    assert!(!result.all_succeeded());

    // No rollback for the non-critical failure and no rows for the skip.
    let history = orch.ledger().history_for(result.run_id).unwrap();
    assert!(history.iter().all(|a| a.phase_id != "after"));
    assert!(history
        .iter()
        .filter(|a| a.phase_id == "optional")
        .all(|a| a.outcome == AttemptOutcome::Failed));
}

#[tokio::test]
async fn overrunning_attempt_times_out() {
    let plan = Plan::validate(vec![phase("stuck", 1, &[])
        .with_retry_limit(1)
        .with_timeout_secs(0)])
    .unwrap();
    let actions = ActionSet::from_plan(&plan).with_action("stuck", Arc::new(StuckAction));
    let orch = Orchestrator::new(plan, actions, Ledger::open_in_memory().unwrap());

    let result = orch.run().await.unwrap();

    assert_eq!(result.phases[0].state, PhaseState::Failed);
    let history = orch.ledger().history_for(result.run_id).unwrap();
    assert_eq!(history[0].outcome, AttemptOutcome::TimedOut);
    assert!(history[0].error.as_deref().unwrap_or("").contains("deadline"));
}

#[tokio::test]
async fn cancellation_skips_remaining_phases() {
    let plan = Plan::validate(vec![phase("a", 1, &[]), phase("b", 2, &["a"])]).unwrap();
    let b = TracerAction::new();
    let actions = ActionSet::from_plan(&plan)
        .with_action("a", TracerAction::new())
        .with_action("b", b.clone());
    let orch = Orchestrator::new(plan, actions, Ledger::open_in_memory().unwrap());

    // Cancel before the run even starts: everything is skipped.
    orch.cancel_handle().store(true, Ordering::SeqCst);
    let result = orch.run().await.unwrap();

    assert!(result.cancelled);
    assert!(result.phases.iter().all(|p| p.state == PhaseState::Skipped));
    assert!(result.phases.iter().all(|p| p.error.as_deref() == Some("run cancelled")));
    assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    assert!(orch.ledger().history_for(result.run_id).unwrap().is_empty());
}

#[tokio::test]
async fn validate_only_runs_probes_without_rollback() {
    let plan =
        Plan::validate(vec![phase("db", 1, &[]).critical().with_retry_limit(1)]).unwrap();
    let doomed = DoomedAction::new();
    let actions = ActionSet::from_plan(&plan).with_action("db", doomed.clone());
    let orch = Orchestrator::new(plan, actions, Ledger::open_in_memory().unwrap())
        .validate_only(true);

    let result = orch.run().await.unwrap();

    // In validate-only mode execute() is skipped, so the doomed action's
    // default validation passes and nothing is rolled back.
    assert_eq!(result.phases[0].state, PhaseState::Succeeded);
    assert_eq!(doomed.rollbacks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unregistered_action_is_a_flagged_vacuous_success() {
    let plan = Plan::validate(vec![phase("ghost", 1, &[]), phase("next", 2, &["ghost"])]).unwrap();
    let next = TracerAction::new();
    // A caller-built set that never registered "ghost".
    let actions = ActionSet::default().with_action("next", next.clone());
    let orch = Orchestrator::new(plan, actions, Ledger::open_in_memory().unwrap());

    let result = orch.run().await.unwrap();

    assert_eq!(result.phases[0].state, PhaseState::Succeeded);
    assert_eq!(result.phases[0].attempts, 0);
    assert_eq!(
        result.phases[0].error.as_deref(),
        Some("no action registered; nothing executed")
    );
    // Dependents are not blocked by the vacuous success.
    assert_eq!(result.phases[1].state, PhaseState::Succeeded);
    assert_eq!(next.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ledger_history_survives_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.db");

    let plan = Plan::validate(vec![phase("db", 1, &[]).with_retry_limit(1)]).unwrap();
    let first_run = {
        let actions = ActionSet::from_plan(&plan).with_action("db", TracerAction::new());
        let orch = Orchestrator::new(plan.clone(), actions, Ledger::open(&ledger_path).unwrap());
        orch.run().await.unwrap().run_id
    };

    let reopened = Ledger::open(&ledger_path).unwrap();
    assert_eq!(reopened.latest_run().unwrap(), Some(first_run));
    assert_eq!(reopened.history_for(first_run).unwrap().len(), 1);
}
