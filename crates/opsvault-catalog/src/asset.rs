//! Catalog domain types
//!
//! [`Asset`] is a preserved script or configuration file; [`EnvVar`] is a
//! named runtime variable. Both are keyed by their path/name and carry the
//! recovery priority that drives restoration order.

use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row identifier assigned by the catalog store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub i64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of preserved asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Executable script (python, shell, sql, ...).
    Script,
    /// Structured configuration file (json, yaml, toml, ini, env, ...).
    Configuration,
}

impl AssetKind {
    /// Stable string form used in the store.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Script => "script",
            AssetKind::Configuration => "configuration",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "script" => Some(AssetKind::Script),
            "configuration" => Some(AssetKind::Configuration),
            _ => None,
        }
    }
}

/// Lowest (most critical) recovery priority.
pub const PRIORITY_CRITICAL: u8 = 1;
/// Default recovery priority for unclassified assets.
pub const PRIORITY_DEFAULT: u8 = 5;
/// Highest (least critical) recovery priority.
pub const PRIORITY_MAX: u8 = 10;

/// A preserved script or configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Store-assigned identifier.
    pub id: AssetId,
    /// Path relative to the workspace root; unique within the catalog.
    pub path: String,
    /// Content hash used for deduplication.
    pub hash: ContentHash,
    /// Script or configuration.
    pub kind: AssetKind,
    /// Category assigned by the external classifier.
    pub category: String,
    /// Recovery priority, 1 (most critical) to 10.
    pub priority: u8,
    /// Content size in bytes.
    pub size: u64,
    /// Non-blank line count.
    pub line_count: u64,
    /// Declared dependency references (e.g. import lines).
    pub dependencies: Vec<String>,
    /// True once a recovery run has validated this asset.
    pub tested: bool,
    /// Timestamp of the last content change.
    pub updated_at: DateTime<Utc>,
}

/// A record produced by the preservation scanner before it is stored.
#[derive(Debug, Clone)]
pub struct NewAsset {
    /// Path relative to the workspace root.
    pub path: String,
    /// File content.
    pub content: Vec<u8>,
    /// Script or configuration.
    pub kind: AssetKind,
    /// Classifier-assigned category.
    pub category: String,
    /// Recovery priority, clamped to 1..=10 by the store.
    pub priority: u8,
    /// Declared dependency references.
    pub dependencies: Vec<String>,
}

impl NewAsset {
    /// Create a record with default category and priority.
    #[must_use]
    pub fn new(path: impl Into<String>, content: Vec<u8>, kind: AssetKind) -> Self {
        Self {
            path: path.into(),
            content,
            kind,
            category: "uncategorized".to_string(),
            priority: PRIORITY_DEFAULT,
            dependencies: Vec::new(),
        }
    }

    /// With a classifier-assigned category.
    #[inline]
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// With a recovery priority.
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// With declared dependencies.
    #[inline]
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// A preserved environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name; unique within the catalog.
    pub name: String,
    /// Stored value. For secrets this is always the masking token.
    pub value: String,
    /// Whether the value was classified as sensitive.
    pub is_secret: bool,
    /// Recovery priority, 1 (most critical) to 10.
    pub priority: u8,
    /// Free-text description.
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_kind_round_trip() {
        for kind in [AssetKind::Script, AssetKind::Configuration] {
            assert_eq!(AssetKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AssetKind::parse("binary"), None);
    }

    #[test]
    fn new_asset_builder() {
        let asset = NewAsset::new("scripts/deploy.py", b"import os".to_vec(), AssetKind::Script)
            .with_category("deployment")
            .with_priority(2)
            .with_dependencies(vec!["import os".to_string()]);

        assert_eq!(asset.path, "scripts/deploy.py");
        assert_eq!(asset.category, "deployment");
        assert_eq!(asset.priority, 2);
        assert_eq!(asset.dependencies.len(), 1);
    }
}
