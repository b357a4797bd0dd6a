//! Append-only execution ledger
//!
//! Every finished attempt of every phase is recorded as one immutable row.
//! Rows are never updated or deleted; the history of a run is the ordered
//! list of its rows. Auditing a recovery means reading this table.

use crate::error::EngineError;
use crate::state::PhaseState;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

/// Identifier of one recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Fresh random run id.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Command and validation both passed.
    Succeeded,
    /// Command or validation failed.
    Failed,
    /// The attempt overran its deadline and was abandoned.
    TimedOut,
    /// The rollback command ran after a critical failure.
    RolledBack,
}

impl AttemptOutcome {
    /// Stable string form used in the store.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Succeeded => "succeeded",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::TimedOut => "timed_out",
            AttemptOutcome::RolledBack => "rolled_back",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(AttemptOutcome::Succeeded),
            "failed" => Some(AttemptOutcome::Failed),
            "timed_out" => Some(AttemptOutcome::TimedOut),
            "rolled_back" => Some(AttemptOutcome::RolledBack),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable ledger row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttemptRecord {
    /// Run this attempt belongs to.
    pub run_id: RunId,
    /// Phase that was attempted.
    pub phase_id: String,
    /// 1-based attempt number within the run.
    pub attempt_no: u32,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt ended.
    pub ended_at: DateTime<Utc>,
    /// Diagnostic for non-success outcomes.
    pub error: Option<String>,
}

/// Append-only attempt store.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open (or create) a ledger at `path`.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// In-memory ledger for tests and dry runs.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, EngineError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS attempts (
                 seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                 run_id     TEXT NOT NULL,
                 phase_id   TEXT NOT NULL,
                 attempt_no INTEGER NOT NULL,
                 outcome    TEXT NOT NULL
                     CHECK(outcome IN ('succeeded', 'failed', 'timed_out', 'rolled_back')),
                 started_at TEXT NOT NULL,
                 ended_at   TEXT NOT NULL,
                 error      TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_attempts_run ON attempts(run_id, seq);",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Append one finished attempt. The row is final; there is no update
    /// path.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn record(&self, record: &AttemptRecord) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO attempts
                 (run_id, phase_id, attempt_no, outcome, started_at, ended_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.run_id.to_string(),
                record.phase_id,
                record.attempt_no,
                record.outcome.as_str(),
                record.started_at.to_rfc3339(),
                record.ended_at.to_rfc3339(),
                record.error,
            ],
        )?;
        tracing::debug!(
            run = %record.run_id,
            phase = %record.phase_id,
            attempt = record.attempt_no,
            outcome = %record.outcome,
            "attempt recorded"
        );
        Ok(())
    }

    /// All attempts of a run, in append order.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn history_for(&self, run_id: RunId) -> Result<Vec<AttemptRecord>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id, phase_id, attempt_no, outcome, started_at, ended_at, error
             FROM attempts WHERE run_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![run_id.to_string()], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Id of the most recently started run, if any.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn latest_run(&self) -> Result<Option<RunId>, EngineError> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row("SELECT run_id FROM attempts ORDER BY seq DESC LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match id {
            Some(id) => {
                let uuid = Uuid::parse_str(&id).map_err(|e| {
                    EngineError::Report(format!("corrupt run id in ledger: {e}"))
                })?;
                Ok(Some(RunId(uuid)))
            }
            None => Ok(None),
        }
    }

    /// Total number of recorded attempts, across all runs.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn attempt_count(&self) -> Result<u64, EngineError> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttemptRecord> {
    let run_str: String = row.get(0)?;
    let outcome_str: String = row.get(3)?;
    let started_str: String = row.get(4)?;
    let ended_str: String = row.get(5)?;

    let parse_ts = |idx: usize, s: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    };

    Ok(AttemptRecord {
        run_id: RunId(Uuid::parse_str(&run_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?),
        phase_id: row.get(1)?,
        attempt_no: row.get(2)?,
        outcome: AttemptOutcome::parse(&outcome_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown outcome: {outcome_str}").into(),
            )
        })?,
        started_at: parse_ts(4, &started_str)?,
        ended_at: parse_ts(5, &ended_str)?,
        error: row.get(6)?,
    })
}

impl From<AttemptOutcome> for PhaseState {
    fn from(outcome: AttemptOutcome) -> Self {
        match outcome {
            AttemptOutcome::Succeeded => PhaseState::Succeeded,
            AttemptOutcome::Failed | AttemptOutcome::TimedOut => PhaseState::Failed,
            AttemptOutcome::RolledBack => PhaseState::RolledBack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(run: RunId, phase: &str, no: u32, outcome: AttemptOutcome) -> AttemptRecord {
        let now = Utc::now();
        AttemptRecord {
            run_id: run,
            phase_id: phase.to_string(),
            attempt_no: no,
            outcome,
            started_at: now,
            ended_at: now,
            error: match outcome {
                AttemptOutcome::Succeeded => None,
                _ => Some("boom".to_string()),
            },
        }
    }

    #[test]
    fn history_preserves_append_order() {
        let ledger = Ledger::open_in_memory().unwrap();
        let run = RunId::new();
        ledger.record(&record(run, "db", 1, AttemptOutcome::Failed)).unwrap();
        ledger.record(&record(run, "db", 2, AttemptOutcome::Succeeded)).unwrap();
        ledger.record(&record(run, "env", 1, AttemptOutcome::Succeeded)).unwrap();

        let history = ledger.history_for(run).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].phase_id, "db");
        assert_eq!(history[0].attempt_no, 1);
        assert_eq!(history[0].outcome, AttemptOutcome::Failed);
        assert_eq!(history[0].error.as_deref(), Some("boom"));
        assert_eq!(history[2].phase_id, "env");
    }

    #[test]
    fn runs_are_isolated() {
        let ledger = Ledger::open_in_memory().unwrap();
        let run_a = RunId::new();
        let run_b = RunId::new();
        ledger.record(&record(run_a, "db", 1, AttemptOutcome::Succeeded)).unwrap();
        ledger.record(&record(run_b, "db", 1, AttemptOutcome::TimedOut)).unwrap();

        assert_eq!(ledger.history_for(run_a).unwrap().len(), 1);
        assert_eq!(ledger.history_for(run_b).unwrap().len(), 1);
        assert_eq!(ledger.latest_run().unwrap(), Some(run_b));
        assert_eq!(ledger.attempt_count().unwrap(), 2);
    }

    #[test]
    fn empty_ledger_has_no_latest_run() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert_eq!(ledger.latest_run().unwrap(), None);
        assert!(ledger.history_for(RunId::new()).unwrap().is_empty());
    }

    #[test]
    fn outcome_maps_to_phase_state() {
        assert_eq!(PhaseState::from(AttemptOutcome::Succeeded), PhaseState::Succeeded);
        assert_eq!(PhaseState::from(AttemptOutcome::TimedOut), PhaseState::Failed);
        assert_eq!(PhaseState::from(AttemptOutcome::RolledBack), PhaseState::RolledBack);
    }
}
