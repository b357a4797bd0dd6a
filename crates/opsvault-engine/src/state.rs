//! Phase lifecycle state machine
//!
//! Every phase moves through a small fixed lifecycle. Transitions outside
//! [`allowed_transitions`] are rejected so the orchestrator can never record
//! an impossible history (e.g. a skipped phase later succeeding).

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one phase within a recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    /// Not yet reached by the scheduler.
    Pending,
    /// An attempt is in flight.
    Running,
    /// An attempt completed and its validation probe passed.
    Succeeded,
    /// The attempt budget is exhausted without success.
    Failed,
    /// A critical failure was compensated by the rollback command.
    RolledBack,
    /// Never attempted because an upstream critical phase failed.
    Skipped,
}

impl PhaseState {
    /// Stable string form used in the ledger.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseState::Pending => "pending",
            PhaseState::Running => "running",
            PhaseState::Succeeded => "succeeded",
            PhaseState::Failed => "failed",
            PhaseState::RolledBack => "rolled_back",
            PhaseState::Skipped => "skipped",
        }
    }

    /// Whether the state is terminal for the run.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PhaseState::Pending | PhaseState::Running)
    }
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from`.
#[must_use]
pub fn allowed_transitions(from: PhaseState) -> Vec<PhaseState> {
    use PhaseState::*;
    match from {
        Pending => vec![Running, Skipped],
        // Running -> Running models a retry after a failed attempt.
        Running => vec![Running, Succeeded, Failed, RolledBack],
        Succeeded | Failed | RolledBack | Skipped => vec![],
    }
}

/// Validate a transition.
///
/// # Errors
/// `IllegalTransition` when the lifecycle does not permit `from -> to`.
pub fn validate_transition(from: PhaseState, to: PhaseState) -> Result<(), EngineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(EngineError::IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for state in [
            PhaseState::Succeeded,
            PhaseState::Failed,
            PhaseState::RolledBack,
            PhaseState::Skipped,
        ] {
            assert!(state.is_terminal());
            assert!(allowed_transitions(state).is_empty());
        }
    }

    #[test]
    fn pending_can_only_start_or_be_skipped() {
        assert!(validate_transition(PhaseState::Pending, PhaseState::Running).is_ok());
        assert!(validate_transition(PhaseState::Pending, PhaseState::Skipped).is_ok());
        assert!(validate_transition(PhaseState::Pending, PhaseState::Succeeded).is_err());
    }

    #[test]
    fn skipped_phase_cannot_succeed() {
        let err = validate_transition(PhaseState::Skipped, PhaseState::Succeeded).unwrap_err();
        assert!(matches!(
            err,
            EngineError::IllegalTransition { from: PhaseState::Skipped, to: PhaseState::Succeeded }
        ));
    }

    #[test]
    fn running_may_retry() {
        assert!(validate_transition(PhaseState::Running, PhaseState::Running).is_ok());
    }
}
