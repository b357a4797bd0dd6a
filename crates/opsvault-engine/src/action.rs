//! Phase actions
//!
//! [`PhaseAction`] is the seam between the orchestrator and the outside
//! world. The production implementation shells out (without a shell) via
//! [`CommandAction`]; tests substitute in-process actions to script failure
//! patterns the real commands cannot reproduce deterministically.

use crate::error::EngineError;
use async_trait::async_trait;
use opsvault_plan::{Command, PhaseSpec};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

/// Outcome of one action invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action completed with a zero exit status.
    Success,
    /// The action completed with a failure; the string is diagnostic.
    Failure(String),
}

impl ActionOutcome {
    /// True for [`ActionOutcome::Success`].
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success)
    }
}

/// Work performed for one phase. All methods are fallible at the transport
/// level (`EngineError::Spawn`); a phase-level failure is an `Ok(Failure)`.
#[async_trait]
pub trait PhaseAction: Send + Sync {
    /// Perform the phase's work.
    async fn execute(&self) -> Result<ActionOutcome, EngineError>;

    /// Probe whether the work actually took effect. Default: trust `execute`.
    async fn validate(&self) -> Result<ActionOutcome, EngineError> {
        Ok(ActionOutcome::Success)
    }

    /// Compensate after a critical failure. Default: nothing to undo.
    async fn rollback(&self) -> Result<ActionOutcome, EngineError> {
        Ok(ActionOutcome::Success)
    }
}

/// Action that runs the phase's declared commands as child processes.
#[derive(Debug, Clone)]
pub struct CommandAction {
    run: Option<Command>,
    validation: Option<Command>,
    rollback: Option<Command>,
}

impl CommandAction {
    /// Build from a phase's declared commands.
    #[must_use]
    pub fn from_spec(spec: &PhaseSpec) -> Self {
        Self {
            run: spec.run.clone(),
            validation: spec.validation.clone(),
            rollback: spec.rollback.clone(),
        }
    }

    async fn invoke(command: &Command) -> Result<ActionOutcome, EngineError> {
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EngineError::Spawn { command: command.to_string(), source })?;

        if output.status.success() {
            Ok(ActionOutcome::Success)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("no output").to_string();
            Ok(ActionOutcome::Failure(format!(
                "{} exited with {}: {detail}",
                command.program, output.status
            )))
        }
    }

    async fn invoke_optional(command: Option<&Command>) -> Result<ActionOutcome, EngineError> {
        match command {
            Some(command) => Self::invoke(command).await,
            None => Ok(ActionOutcome::Success),
        }
    }
}

#[async_trait]
impl PhaseAction for CommandAction {
    async fn execute(&self) -> Result<ActionOutcome, EngineError> {
        Self::invoke_optional(self.run.as_ref()).await
    }

    async fn validate(&self) -> Result<ActionOutcome, EngineError> {
        Self::invoke_optional(self.validation.as_ref()).await
    }

    async fn rollback(&self) -> Result<ActionOutcome, EngineError> {
        Self::invoke_optional(self.rollback.as_ref()).await
    }
}

/// Maps phase ids to their actions. Defaults every phase to [`CommandAction`]
/// and lets callers override individual phases.
#[derive(Default)]
pub struct ActionSet {
    actions: HashMap<String, Arc<dyn PhaseAction>>,
}

impl std::fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSet").field("phases", &self.actions.len()).finish()
    }
}

impl ActionSet {
    /// Command-backed actions for every phase of a plan.
    #[must_use]
    pub fn from_plan(plan: &opsvault_plan::Plan) -> Self {
        let mut set = Self::default();
        for spec in plan.phases() {
            set.actions
                .insert(spec.id.clone(), Arc::new(CommandAction::from_spec(spec)));
        }
        set
    }

    /// Replace the action for one phase.
    #[must_use]
    pub fn with_action(mut self, phase_id: impl Into<String>, action: Arc<dyn PhaseAction>) -> Self {
        self.actions.insert(phase_id.into(), action);
        self
    }

    /// Action for a phase, if one is registered.
    #[must_use]
    pub fn get(&self, phase_id: &str) -> Option<Arc<dyn PhaseAction>> {
        self.actions.get(phase_id).cloned()
    }
}
