//! JSON recovery report
//!
//! After a run, the orchestrator's result, the ledger history and an
//! optional readiness score are folded into one serializable report for
//! operators and downstream tooling.

use crate::engine::{PhaseResult, RunResult};
use crate::error::EngineError;
use crate::ledger::{AttemptRecord, Ledger, RunId};
use crate::score::ScoreReport;
use chrono::{DateTime, Utc};
use opsvault_plan::Plan;
use std::path::Path;

/// Complete record of one recovery run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecoveryReport {
    /// Run id, shared with the ledger.
    pub run_id: RunId,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Whether every critical phase succeeded.
    pub success: bool,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
    /// Per-phase terminal states, in execution order.
    pub phases: Vec<PhaseResult>,
    /// Every recorded attempt, in append order.
    pub attempts: Vec<AttemptRecord>,
    /// Readiness score after the run, when one was computed.
    pub readiness: Option<ScoreReport>,
}

impl RecoveryReport {
    /// Assemble a report from a finished run.
    ///
    /// # Errors
    /// Storage errors while reading the ledger history.
    pub fn build(
        plan: &Plan,
        result: &RunResult,
        ledger: &Ledger,
        readiness: Option<ScoreReport>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            run_id: result.run_id,
            generated_at: Utc::now(),
            success: result.success(plan),
            cancelled: result.cancelled,
            duration_ms: result.elapsed().num_milliseconds(),
            phases: result.phases.clone(),
            attempts: ledger.history_for(result.run_id)?,
            readiness,
        })
    }

    /// Pretty-printed JSON form.
    ///
    /// # Errors
    /// Serialization failures surface as [`EngineError::Report`].
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Report(e.to_string()))
    }

    /// Write the JSON report to a file.
    ///
    /// # Errors
    /// Serialization or filesystem failures.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json)
            .map_err(|e| EngineError::Report(format!("{}: {e}", path.as_ref().display())))?;
        tracing::info!(path = %path.as_ref().display(), "recovery report written");
        Ok(())
    }
}
