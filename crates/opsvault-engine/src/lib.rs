//! Phased recovery orchestration
//!
//! Executes validated recovery plans from `opsvault-plan` against preserved
//! state from `opsvault-catalog`. Every attempt lands in an append-only
//! ledger, and the readiness scorer turns catalog statistics into a
//! 0 to 100 preparedness figure.

pub mod action;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod report;
pub mod score;
pub mod state;

pub use action::{ActionOutcome, ActionSet, CommandAction, PhaseAction};
pub use engine::{Orchestrator, PhaseResult, RunResult};
pub use error::EngineError;
pub use ledger::{AttemptOutcome, AttemptRecord, Ledger, RunId};
pub use report::RecoveryReport;
pub use score::{Factor, FactorScore, ReadinessInputs, ScoreCard, ScoreReport};
pub use state::{allowed_transitions, validate_transition, PhaseState};
