//! Recovery phase definitions
//!
//! A [`PhaseSpec`] describes one unit of recovery work: the command that
//! performs it, an optional validation probe, an optional rollback command,
//! and the retry/timeout envelope the orchestrator enforces around every
//! attempt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default total attempt budget per phase.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
/// Multiplier applied to the estimated duration to derive the hard timeout.
pub const TIMEOUT_FACTOR: u32 = 2;

/// An external command, executed without a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Program to invoke.
    pub program: String,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Command {
    /// Build a command from a program name.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Append one argument.
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// One phase of a recovery plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Unique phase id within the plan.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Declared execution order, used as a deterministic tie-break between
    /// phases the dependency graph leaves unordered.
    pub execution_order: u32,
    /// Ids of phases that must succeed before this one runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Whether failure aborts every dependent phase.
    #[serde(default)]
    pub critical: bool,
    /// Total attempt budget. A limit of 3 means at most three attempts.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Estimated wall-clock duration in seconds.
    pub estimated_secs: u64,
    /// Hard per-attempt deadline in seconds. Defaults to twice the estimate.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Command that performs the phase. `None` means the phase is a pure
    /// checkpoint whose validation probe does all the work.
    #[serde(default)]
    pub run: Option<Command>,
    /// Probe run after `run` succeeds; a non-zero exit fails the attempt.
    #[serde(default)]
    pub validation: Option<Command>,
    /// Compensation command run when a critical phase exhausts its budget.
    #[serde(default)]
    pub rollback: Option<Command>,
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

impl PhaseSpec {
    /// Phase with the given id, order and estimate; everything else default.
    #[must_use]
    pub fn new(id: impl Into<String>, execution_order: u32, estimated_secs: u64) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            execution_order,
            dependencies: Vec::new(),
            critical: false,
            retry_limit: DEFAULT_RETRY_LIMIT,
            estimated_secs,
            timeout_secs: None,
            run: None,
            validation: None,
            rollback: None,
        }
    }

    /// With a description.
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With dependency phase ids.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the phase critical.
    #[inline]
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// With a total attempt budget.
    #[inline]
    #[must_use]
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// With an explicit per-attempt timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// With the command that performs the phase.
    #[inline]
    #[must_use]
    pub fn with_run(mut self, command: Command) -> Self {
        self.run = Some(command);
        self
    }

    /// With a validation probe.
    #[inline]
    #[must_use]
    pub fn with_validation(mut self, command: Command) -> Self {
        self.validation = Some(command);
        self
    }

    /// With a rollback command.
    #[inline]
    #[must_use]
    pub fn with_rollback(mut self, command: Command) -> Self {
        self.rollback = Some(command);
        self
    }

    /// Effective per-attempt timeout: the explicit value if set, otherwise
    /// twice the estimated duration.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .unwrap_or(self.estimated_secs.saturating_mul(u64::from(TIMEOUT_FACTOR))),
        )
    }
}

/// The built-in seven-phase recovery plan: a linear chain from storage up
/// through monitoring, with the first five phases critical.
#[must_use]
pub fn default_plan() -> Vec<PhaseSpec> {
    let probe = |code: &str| Command::new("python3").arg("-c").arg(code);
    vec![
        PhaseSpec::new("database_infrastructure", 1, 30 * 60)
            .with_description("Restore database infrastructure")
            .critical()
            .with_retry_limit(5)
            .with_validation(probe(
                "import sqlite3; c=sqlite3.connect('production.db'); \
                 assert c.execute(\"SELECT COUNT(*) FROM sqlite_master WHERE type='table'\").fetchone()[0] > 0",
            ))
            .with_rollback(Command::new("cp").args(["production.db.backup", "production.db"])),
        PhaseSpec::new("environment_setup", 2, 45 * 60)
            .with_description("Restore environment configuration")
            .with_dependencies(["database_infrastructure"])
            .critical()
            .with_retry_limit(3)
            .with_validation(probe("import os; assert any('PATH' in k for k in os.environ)")),
        PhaseSpec::new("script_regeneration", 3, 120 * 60)
            .with_description("Restore core scripts from the catalog")
            .with_dependencies(["environment_setup"])
            .critical()
            .with_retry_limit(2)
            .with_validation(Command::new("python3").args(["-m", "compileall", "-q", "."]))
            .with_rollback(Command::new("git").args(["checkout", "HEAD", "--", "."])),
        PhaseSpec::new("config_restoration", 4, 30 * 60)
            .with_description("Restore configuration files")
            .with_dependencies(["script_regeneration"])
            .critical()
            .with_retry_limit(3)
            .with_validation(probe("import json, configparser"))
            .with_rollback(Command::new("cp").args(["-r", "config.backup/.", "config/"])),
        PhaseSpec::new("dependency_validation", 5, 60 * 60)
            .with_description("Validate service dependencies")
            .with_dependencies(["config_restoration"])
            .critical()
            .with_retry_limit(2)
            .with_validation(probe("import sqlite3, json, pathlib"))
            .with_rollback(Command::new("pip").args(["install", "-r", "requirements.txt"])),
        PhaseSpec::new("application_recovery", 6, 90 * 60)
            .with_description("Bring the application layer back up")
            .with_dependencies(["dependency_validation"])
            .with_retry_limit(1)
            .with_validation(probe(
                "from pathlib import Path; assert Path('production.db').exists()",
            ))
            .with_rollback(Command::new("systemctl").args(["restart", "application.service"])),
        PhaseSpec::new("monitoring_optimization", 7, 30 * 60)
            .with_description("Restore monitoring and tune performance")
            .with_dependencies(["application_recovery"])
            .with_retry_limit(1)
            .with_validation(probe("import psutil; assert psutil.cpu_percent() < 95")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_defaults_to_twice_the_estimate() {
        let phase = PhaseSpec::new("db", 1, 300);
        assert_eq!(phase.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn explicit_timeout_wins() {
        let phase = PhaseSpec::new("db", 1, 300).with_timeout_secs(60);
        assert_eq!(phase.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn default_plan_shape() {
        let plan = default_plan();
        assert_eq!(plan.len(), 7);
        assert!(plan[0].dependencies.is_empty());
        assert_eq!(plan.iter().filter(|p| p.critical).count(), 5);
        for pair in plan.windows(2) {
            assert_eq!(pair[1].dependencies, vec![pair[0].id.clone()]);
        }
    }

    #[test]
    fn phase_serde_round_trip() {
        let phase = PhaseSpec::new("db", 1, 60)
            .critical()
            .with_dependencies(["env"])
            .with_run(Command::new("restore-db").arg("--fast"));
        let json = serde_json::to_string(&phase).unwrap();
        let decoded: PhaseSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(phase, decoded);
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let decoded: PhaseSpec = serde_json::from_str(
            r#"{"id": "db", "execution_order": 1, "estimated_secs": 60}"#,
        )
        .unwrap();
        assert_eq!(decoded.retry_limit, DEFAULT_RETRY_LIMIT);
        assert!(!decoded.critical);
        assert!(decoded.run.is_none());
        assert_eq!(decoded.timeout(), Duration::from_secs(120));
    }
}
