//! SQLite-backed preservation catalog
//!
//! Durable, content-addressed storage for [`Asset`]s and [`EnvVar`]s plus the
//! persisted recovery-plan metadata the readiness scorer reads. All writes go
//! through one serialized connection; every public call is transactional, so a
//! crash mid-write never leaves a half-updated row.

use crate::asset::{Asset, AssetId, AssetKind, EnvVar, NewAsset, PRIORITY_CRITICAL, PRIORITY_MAX};
use crate::classify::{KeywordSecretClassifier, SecretClassifier};
use crate::error::CatalogError;
use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Catalog schema version, stored in `user_version`.
const SCHEMA_VERSION: i64 = 1;
/// Busy timeout for concurrent readers.
const BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default content size ceiling: 10 MiB.
pub const DEFAULT_CONTENT_CEILING: u64 = 10 * 1024 * 1024;
/// Token stored in place of secret values.
pub const MASK_TOKEN: &str = "[MASKED]";

/// File names treated as dependency manifests for readiness scoring.
const DEPENDENCY_MANIFESTS: &[&str] = &[
    "requirements.txt",
    "package.json",
    "pyproject.toml",
    "Cargo.toml",
    "setup.py",
    "go.mod",
];

/// Explicit catalog configuration (no global state).
pub struct CatalogConfig {
    /// Maximum content size accepted by `preserve`, in bytes.
    pub content_ceiling: u64,
    /// Secret-name policy applied to environment variables.
    pub secrets: Box<dyn SecretClassifier>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            content_ceiling: DEFAULT_CONTENT_CEILING,
            secrets: Box::new(KeywordSecretClassifier),
        }
    }
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("content_ceiling", &self.content_ceiling)
            .finish_non_exhaustive()
    }
}

/// One phase row of a validated recovery plan, persisted for scoring.
#[derive(Debug, Clone)]
pub struct PlanPhaseRecord {
    /// Phase id, unique within the plan.
    pub id: String,
    /// Declared execution order.
    pub exec_order: u32,
    /// Dependency phase ids.
    pub dependencies: Vec<String>,
    /// Whether failure aborts the dependent subgraph.
    pub critical: bool,
    /// Total attempt budget.
    pub retry_limit: u32,
    /// Hard per-attempt deadline in seconds.
    pub timeout_secs: u64,
}

/// Aggregate counts used by the readiness scorer and CLI summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    /// Preserved script assets.
    pub script_count: u64,
    /// Script assets validated by a recovery run.
    pub tested_script_count: u64,
    /// Preserved configuration assets.
    pub config_count: u64,
    /// Preserved environment variables.
    pub env_var_count: u64,
    /// Phases of the last validated plan.
    pub phase_count: u64,
    /// Whether a dependency manifest (requirements.txt etc.) is preserved.
    pub has_dependency_manifest: bool,
}

/// Durable preservation catalog.
pub struct Catalog {
    conn: Mutex<Connection>,
    config: CatalogConfig,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open (or create) a catalog at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated. This is
    /// the storage-unavailability case that aborts a whole invocation.
    pub fn open(path: impl AsRef<Path>, config: CatalogConfig) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, config)
    }

    /// Open an in-memory catalog (tests and dry runs).
    ///
    /// # Errors
    /// Returns an error if schema setup fails.
    pub fn open_in_memory(config: CatalogConfig) -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: CatalogConfig) -> Result<Self, CatalogError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        let catalog = Self { conn: Mutex::new(conn), config };
        catalog.migrate()?;
        Ok(catalog)
    }

    fn migrate(&self) -> Result<(), CatalogError> {
        let conn = self.conn.lock();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version >= SCHEMA_VERSION {
            return Ok(());
        }
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS assets (
                 id           INTEGER PRIMARY KEY AUTOINCREMENT,
                 path         TEXT NOT NULL UNIQUE,
                 content      BLOB NOT NULL,
                 hash         TEXT NOT NULL,
                 kind         TEXT NOT NULL CHECK(kind IN ('script', 'configuration')),
                 category     TEXT NOT NULL DEFAULT 'uncategorized',
                 priority     INTEGER NOT NULL DEFAULT 5 CHECK(priority BETWEEN 1 AND 10),
                 size         INTEGER NOT NULL,
                 line_count   INTEGER NOT NULL,
                 dependencies TEXT NOT NULL DEFAULT '[]',
                 tested       INTEGER NOT NULL DEFAULT 0,
                 updated_at   TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_assets_priority ON assets(priority, path);
             CREATE INDEX IF NOT EXISTS idx_assets_category ON assets(category);
             CREATE TABLE IF NOT EXISTS env_vars (
                 name        TEXT PRIMARY KEY,
                 value       TEXT NOT NULL,
                 is_secret   INTEGER NOT NULL,
                 priority    INTEGER NOT NULL CHECK(priority BETWEEN 1 AND 10),
                 description TEXT NOT NULL DEFAULT ''
             );
             CREATE TABLE IF NOT EXISTS phases (
                 id           TEXT PRIMARY KEY,
                 exec_order   INTEGER NOT NULL,
                 dependencies TEXT NOT NULL DEFAULT '[]',
                 critical     INTEGER NOT NULL,
                 retry_limit  INTEGER NOT NULL,
                 timeout_secs INTEGER NOT NULL
             );
             PRAGMA user_version = 1;
             COMMIT;",
        )?;
        Ok(())
    }

    /// Preserve an asset, keyed by path.
    ///
    /// Idempotent: if the path already exists with an identical content hash,
    /// the existing id is returned and the row (including `updated_at`) is
    /// untouched. Otherwise the row is inserted or updated in one
    /// transaction.
    ///
    /// # Errors
    /// `ContentTooLarge` if the content exceeds the configured ceiling;
    /// storage errors otherwise.
    pub fn preserve(&self, asset: NewAsset) -> Result<AssetId, CatalogError> {
        let size = asset.content.len() as u64;
        if size > self.config.content_ceiling {
            return Err(CatalogError::ContentTooLarge {
                path: asset.path,
                size,
                ceiling: self.config.content_ceiling,
            });
        }

        let hash = ContentHash::compute(&asset.content);
        let line_count = count_nonblank_lines(&asset.content);
        let priority = asset.priority.clamp(PRIORITY_CRITICAL, PRIORITY_MAX);
        let deps = serde_json::to_string(&asset.dependencies)
            .map_err(|e| CatalogError::Corrupt(e.to_string()))?;
        let now = Utc::now();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, hash FROM assets WHERE path = ?1",
                params![asset.path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, stored_hash)) = &existing {
            if *stored_hash == hash.to_string() {
                tx.commit()?;
                tracing::debug!(path = %asset.path, hash = %hash.short(), "unchanged, skipping");
                return Ok(AssetId(*id));
            }
        }

        tx.execute(
            "INSERT INTO assets
                 (path, content, hash, kind, category, priority, size, line_count,
                  dependencies, tested, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
             ON CONFLICT(path) DO UPDATE SET
                 content = excluded.content,
                 hash = excluded.hash,
                 kind = excluded.kind,
                 category = excluded.category,
                 priority = excluded.priority,
                 size = excluded.size,
                 line_count = excluded.line_count,
                 dependencies = excluded.dependencies,
                 tested = 0,
                 updated_at = excluded.updated_at",
            params![
                asset.path,
                asset.content,
                hash.to_string(),
                asset.kind.as_str(),
                asset.category,
                priority,
                size,
                line_count,
                deps,
                now.to_rfc3339(),
            ],
        )?;
        let id: i64 = tx.query_row(
            "SELECT id FROM assets WHERE path = ?1",
            params![asset.path],
            |row| row.get(0),
        )?;
        tx.commit()?;

        tracing::info!(path = %asset.path, hash = %hash.short(), "preserved");
        Ok(AssetId(id))
    }

    /// Return the stored content of an asset verbatim.
    ///
    /// # Errors
    /// `AssetNotFound` if the id is unknown.
    pub fn restore(&self, id: AssetId) -> Result<Vec<u8>, CatalogError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT content FROM assets WHERE id = ?1", params![id.0], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or(CatalogError::AssetNotFound(id))
    }

    /// Look up an asset by path.
    ///
    /// # Errors
    /// Storage errors only; an unknown path yields `Ok(None)`.
    pub fn get_by_path(&self, path: &str) -> Result<Option<Asset>, CatalogError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, path, hash, kind, category, priority, size, line_count,
                    dependencies, tested, updated_at
             FROM assets WHERE path = ?1",
        )?;
        let asset = stmt.query_row(params![path], row_to_asset).optional()?;
        Ok(asset)
    }

    /// Assets with priority at or below `max_priority`, ordered by priority
    /// ascending, then path ascending. The ordering is deterministic so
    /// reports are reproducible.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn list_by_priority(&self, max_priority: u8) -> Result<Vec<Asset>, CatalogError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, path, hash, kind, category, priority, size, line_count,
                    dependencies, tested, updated_at
             FROM assets WHERE priority <= ?1
             ORDER BY priority ASC, path ASC",
        )?;
        let rows = stmt.query_map(params![max_priority], row_to_asset)?;
        let mut assets = Vec::new();
        for row in rows {
            assets.push(row?);
        }
        Ok(assets)
    }

    /// Remove an asset by path. This is an explicit operator action; the
    /// preservation scan never deletes rows.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn remove(&self, path: &str) -> Result<bool, CatalogError> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM assets WHERE path = ?1", params![path])?;
        Ok(changed > 0)
    }

    /// Upsert an environment variable by name.
    ///
    /// Masking is the catalog's responsibility: if the injected secret policy
    /// flags the name, the masking token is stored and the real value never
    /// touches disk.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn preserve_env_var(
        &self,
        name: &str,
        value: &str,
        priority: u8,
        description: &str,
    ) -> Result<EnvVar, CatalogError> {
        let is_secret = self.config.secrets.is_secret(name);
        let stored = if is_secret { MASK_TOKEN } else { value };
        let priority = priority.clamp(PRIORITY_CRITICAL, PRIORITY_MAX);

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO env_vars (name, value, is_secret, priority, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                 value = excluded.value,
                 is_secret = excluded.is_secret,
                 priority = excluded.priority,
                 description = excluded.description",
            params![name, stored, is_secret, priority, description],
        )?;

        Ok(EnvVar {
            name: name.to_string(),
            value: stored.to_string(),
            is_secret,
            priority,
            description: description.to_string(),
        })
    }

    /// Whether the injected secret policy would mask this variable name.
    #[inline]
    #[must_use]
    pub fn is_secret_name(&self, name: &str) -> bool {
        self.config.secrets.is_secret(name)
    }

    /// All preserved environment variables, ordered by priority then name.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn env_vars(&self) -> Result<Vec<EnvVar>, CatalogError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, value, is_secret, priority, description
             FROM env_vars ORDER BY priority ASC, name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EnvVar {
                name: row.get(0)?,
                value: row.get(1)?,
                is_secret: row.get(2)?,
                priority: row.get(3)?,
                description: row.get(4)?,
            })
        })?;
        let mut vars = Vec::new();
        for row in rows {
            vars.push(row?);
        }
        Ok(vars)
    }

    /// Replace the persisted plan metadata with a freshly validated plan.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn record_plan(&self, phases: &[PlanPhaseRecord]) -> Result<(), CatalogError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM phases", [])?;
        for phase in phases {
            let deps = serde_json::to_string(&phase.dependencies)
                .map_err(|e| CatalogError::Corrupt(e.to_string()))?;
            tx.execute(
                "INSERT INTO phases (id, exec_order, dependencies, critical, retry_limit, timeout_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    phase.id,
                    phase.exec_order,
                    deps,
                    phase.critical,
                    phase.retry_limit,
                    phase.timeout_secs as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Flag assets at or below `max_priority` as validated by a recovery run.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn mark_tested(&self, max_priority: u8) -> Result<u64, CatalogError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE assets SET tested = 1 WHERE priority <= ?1",
            params![max_priority],
        )?;
        Ok(changed as u64)
    }

    /// Aggregate counts for scoring and reporting.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let conn = self.conn.lock();
        let script_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM assets WHERE kind = 'script'",
            [],
            |row| row.get(0),
        )?;
        let tested_script_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM assets WHERE kind = 'script' AND tested = 1",
            [],
            |row| row.get(0),
        )?;
        let config_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM assets WHERE kind = 'configuration'",
            [],
            |row| row.get(0),
        )?;
        let env_var_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM env_vars", [], |row| row.get(0))?;
        let phase_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM phases", [], |row| row.get(0))?;

        let mut has_dependency_manifest = false;
        let mut stmt = conn.prepare("SELECT path FROM assets")?;
        let paths = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for path in paths {
            let path = path?;
            let name = path.rsplit(['/', '\\']).next().unwrap_or(&path);
            if DEPENDENCY_MANIFESTS.contains(&name) {
                has_dependency_manifest = true;
                break;
            }
        }

        Ok(CatalogStats {
            script_count,
            tested_script_count,
            config_count,
            env_var_count,
            phase_count,
            has_dependency_manifest,
        })
    }

    /// Asset counts per category, largest first, ties by name.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn category_breakdown(&self) -> Result<Vec<(String, u64)>, CatalogError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM assets \
             GROUP BY category ORDER BY COUNT(*) DESC, category ASC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut breakdown = Vec::new();
        for row in rows {
            breakdown.push(row?);
        }
        Ok(breakdown)
    }
}

fn row_to_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<Asset> {
    let hash_str: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let deps_str: String = row.get(8)?;
    let updated_str: String = row.get(10)?;

    let hash: ContentHash = hash_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let kind = AssetKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown asset kind: {kind_str}").into(),
        )
    })?;
    let dependencies: Vec<String> = serde_json::from_str(&deps_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Asset {
        id: AssetId(row.get(0)?),
        path: row.get(1)?,
        hash,
        kind,
        category: row.get(4)?,
        priority: row.get(5)?,
        size: row.get(6)?,
        line_count: row.get(7)?,
        dependencies,
        tested: row.get(9)?,
        updated_at,
    })
}

fn count_nonblank_lines(content: &[u8]) -> u64 {
    String::from_utf8_lossy(content)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count() as u64
}
