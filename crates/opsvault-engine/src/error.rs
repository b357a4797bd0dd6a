//! Engine error types

use crate::state::PhaseState;

/// Errors raised by the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The lifecycle does not permit this transition.
    #[error("illegal phase transition: {from} -> {to}")]
    IllegalTransition { from: PhaseState, to: PhaseState },

    /// The ledger store failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    /// The catalog rejected an operation during the run.
    #[error(transparent)]
    Catalog(#[from] opsvault_catalog::CatalogError),

    /// Readiness factor weights do not sum to 100.
    #[error("factor weights sum to {0}, expected 100")]
    InvalidWeights(u32),

    /// A report could not be serialized or written.
    #[error("report error: {0}")]
    Report(String),

    /// Failed to spawn or wait on a phase command.
    #[error("command {command} failed to launch: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
