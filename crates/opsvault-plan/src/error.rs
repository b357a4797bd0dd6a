//! Plan validation errors

/// Errors raised while validating a recovery plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The plan declares no phases at all.
    #[error("plan has no phases")]
    EmptyPlan,

    /// Two phases share the same id.
    #[error("duplicate phase id: {0}")]
    DuplicatePhase(String),

    /// A phase depends on itself.
    #[error("phase {0} depends on itself")]
    SelfDependency(String),

    /// A phase names a dependency that does not exist in the plan.
    #[error("phase {phase} depends on unknown phase {missing}")]
    UnknownDependency { phase: String, missing: String },

    /// The dependency graph contains a cycle. `path` names the phases on the
    /// cycle in traversal order, ending where it started.
    #[error("dependency cycle: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    /// A phase declares a zero attempt budget.
    #[error("phase {0} has retry limit 0; at least one attempt is required")]
    ZeroRetryLimit(String),

    /// A plan file could not be decoded.
    #[error("malformed plan: {0}")]
    Malformed(#[from] serde_json::Error),
}
