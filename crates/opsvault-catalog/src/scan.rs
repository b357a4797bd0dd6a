//! Workspace preservation scanner
//!
//! Walks a directory tree, recognizes scripts and configuration files by
//! extension, classifies them, and preserves each one into the catalog. The
//! scan is additive: files that disappeared from disk keep their catalog rows
//! until an operator removes them explicitly.

use crate::asset::{AssetKind, NewAsset};
use crate::classify::{Classifier, KeywordClassifier};
use crate::error::CatalogError;
use crate::store::Catalog;
use std::path::Path;
use walkdir::WalkDir;

/// Extensions recognized as executable scripts.
const SCRIPT_EXTENSIONS: &[&str] = &["py", "ps1", "sh", "sql"];
/// Extensions recognized as configuration files.
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "ini", "toml", "env", "cfg", "conf"];
/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "__pycache__", "target", ".venv", "venv"];
/// Upper bound on extracted dependency lines per asset.
const MAX_DEPENDENCIES: usize = 20;
/// Dependency manifests preserved even when their extension is unrecognized.
const MANIFEST_FILES: &[&str] =
    &["requirements.txt", "package.json", "pyproject.toml", "Cargo.toml", "setup.py", "go.mod"];

/// Outcome of one preservation scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Assets preserved or refreshed.
    pub preserved: usize,
    /// Assets skipped because they were unreadable or oversized.
    pub skipped: Vec<String>,
}

/// Scanner configuration.
pub struct Scanner {
    classifier: Box<dyn Classifier>,
    category_override: Option<String>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            classifier: Box::new(KeywordClassifier),
            category_override: None,
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("category_override", &self.category_override)
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// Scanner with the default keyword classifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Force every scanned asset into one category, bypassing the classifier.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_override = Some(category.into());
        self
    }

    /// Walk `root` and preserve every recognized file into `catalog`.
    ///
    /// Per-file failures (unreadable, oversized) are recorded in the summary
    /// and the scan continues; only storage-level failures abort.
    ///
    /// # Errors
    /// Returns an error if the catalog store itself fails.
    pub fn scan(&self, catalog: &Catalog, root: &Path) -> Result<ScanSummary, CatalogError> {
        let mut summary = ScanSummary::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable entry, skipping");
                    summary.skipped.push(err.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(kind) = recognize(entry.path()) else {
                continue;
            };

            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            let content = match std::fs::read(entry.path()) {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(path = %rel, error = %err, "read failed, skipping");
                    summary.skipped.push(rel);
                    continue;
                }
            };

            let category = self
                .category_override
                .clone()
                .unwrap_or_else(|| self.classifier.classify(&rel, &content, kind));
            let priority = self.classifier.priority(&rel, &category);
            let dependencies = extract_dependencies(&content, kind);

            let asset = NewAsset::new(rel.clone(), content, kind)
                .with_category(category)
                .with_priority(priority)
                .with_dependencies(dependencies);

            match catalog.preserve(asset) {
                Ok(_) => summary.preserved += 1,
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(path = %rel, error = %err, "skipping asset");
                    summary.skipped.push(rel);
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            preserved = summary.preserved,
            skipped = summary.skipped.len(),
            "scan complete"
        );
        Ok(summary)
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    // depth 0 is the scan root, which may itself be a dot directory
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name) || name.starts_with('.'))
}

/// Map a path to an asset kind by extension, or `None` if unrecognized.
/// Dependency manifests are always preserved as configuration.
#[must_use]
pub fn recognize(path: &Path) -> Option<AssetKind> {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_lowercase();
        if SCRIPT_EXTENSIONS.contains(&ext.as_str()) {
            return Some(AssetKind::Script);
        }
        if CONFIG_EXTENSIONS.contains(&ext.as_str()) {
            return Some(AssetKind::Configuration);
        }
    }
    let name = path.file_name()?.to_str()?;
    MANIFEST_FILES
        .contains(&name)
        .then_some(AssetKind::Configuration)
}

/// Pull import-style dependency lines out of script content, capped at
/// [`MAX_DEPENDENCIES`]. Configuration files declare no dependencies.
#[must_use]
pub fn extract_dependencies(content: &[u8], kind: AssetKind) -> Vec<String> {
    if kind != AssetKind::Script {
        return Vec::new();
    }
    String::from_utf8_lossy(content)
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with("import ") || line.starts_with("from ") || line.starts_with("source ")
        })
        .map(str::to_string)
        .take(MAX_DEPENDENCIES)
        .collect()
}
