//! Recovery plan model
//!
//! Defines the phases of a recovery plan and validates them into a
//! deterministic, dependency-ordered schedule. The orchestration engine
//! executes a [`Plan`]; it never sees an unvalidated phase set.

pub mod error;
pub mod graph;
pub mod phase;

pub use error::PlanError;
pub use graph::Plan;
pub use phase::{default_plan, Command, PhaseSpec, DEFAULT_RETRY_LIMIT, TIMEOUT_FACTOR};
