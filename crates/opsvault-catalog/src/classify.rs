//! Pluggable classification seams
//!
//! The catalog never hard-codes categorization or secret-detection policy.
//! [`Classifier`] maps file content to a category string; [`SecretClassifier`]
//! decides whether an environment variable value must be masked before it is
//! stored. Both ship with keyword-table defaults matching operational
//! conventions, but callers may inject their own.

use crate::asset::{AssetKind, PRIORITY_CRITICAL, PRIORITY_DEFAULT};

/// Maps raw content + path to a human-readable category string.
pub trait Classifier: Send + Sync {
    /// Classify a file. Implementations must be pure and cheap; only the
    /// leading portion of `content` should be inspected for large files.
    fn classify(&self, path: &str, content: &[u8], kind: AssetKind) -> String;

    /// Derive a recovery priority for a file, 1 (most critical) to 10.
    fn priority(&self, path: &str, category: &str) -> u8;
}

/// Decides whether an environment variable holds sensitive data.
pub trait SecretClassifier: Send + Sync {
    /// Returns true if the variable's value must be masked in storage.
    fn is_secret(&self, name: &str) -> bool;
}

/// How many leading bytes of content the default classifier inspects.
const CONTENT_PROBE_LEN: usize = 1000;

/// Default keyword-table classifier.
///
/// Matches category keywords against the lowercased file name and the first
/// kilobyte of content, first match wins in declaration order.
#[derive(Debug, Default)]
pub struct KeywordClassifier;

/// Ordered category table: first matching entry wins.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("database", &["db_", "database", "sqlite", "schema", "sql"]),
    ("analytics", &["analytics", "analysis", "metrics", "report", "stats"]),
    ("deployment", &["deploy", "production", "staging", "docker"]),
    ("validation", &["validation", "validator", "test", "verify"]),
    ("monitoring", &["monitor", "health", "performance", "check"]),
    // "rest" would also match restore/restart, so it is not a keyword here.
    ("api", &["api", "endpoint", "service"]),
    ("authentication", &["auth", "security", "login"]),
    ("configuration", &["config", "setting", "env", "setup"]),
    ("backup", &["backup", "recovery", "restore", "archive"]),
    ("migration", &["migration", "migrate", "transfer"]),
    ("automation", &["automation", "batch", "cron"]),
];

impl Classifier for KeywordClassifier {
    fn classify(&self, path: &str, content: &[u8], _kind: AssetKind) -> String {
        let name = file_name_lower(path);
        let probe = String::from_utf8_lossy(&content[..content.len().min(CONTENT_PROBE_LEN)])
            .to_lowercase();

        for (category, keywords) in CATEGORIES {
            if keywords.iter().any(|k| name.contains(k) || probe.contains(k)) {
                return (*category).to_string();
            }
        }
        "uncategorized".to_string()
    }

    fn priority(&self, path: &str, category: &str) -> u8 {
        let name = file_name_lower(path);
        if ["production", "critical", "main", "__init__", "startup"]
            .iter()
            .any(|k| name.contains(k))
        {
            PRIORITY_CRITICAL
        } else if ["deploy", "config", "auth", "security"].iter().any(|k| name.contains(k)) {
            2
        } else if matches!(category, "database" | "validation" | "monitoring") {
            3
        } else {
            PRIORITY_DEFAULT
        }
    }
}

fn file_name_lower(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_lowercase()
}

/// Default secret classifier: substring match on the uppercased name.
#[derive(Debug, Default)]
pub struct KeywordSecretClassifier;

const SECRET_MARKERS: &[&str] = &["KEY", "SECRET", "PASSWORD", "TOKEN", "CREDENTIAL"];

impl SecretClassifier for KeywordSecretClassifier {
    fn is_secret(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        SECRET_MARKERS.iter().any(|m| upper.contains(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_file_name() {
        let c = KeywordClassifier;
        assert_eq!(c.classify("scripts/db_migrate.py", b"", AssetKind::Script), "database");
        assert_eq!(
            c.classify("deploy/production.yaml", b"", AssetKind::Configuration),
            "deployment"
        );
    }

    #[test]
    fn classifies_by_content_probe() {
        let c = KeywordClassifier;
        let category = c.classify("tool.py", b"import sqlite3\nconn = ...", AssetKind::Script);
        assert_eq!(category, "database");
    }

    #[test]
    fn falls_back_to_uncategorized() {
        let c = KeywordClassifier;
        assert_eq!(c.classify("notes.txt", b"hello", AssetKind::Configuration), "uncategorized");
    }

    #[test]
    fn priority_heuristics() {
        let c = KeywordClassifier;
        assert_eq!(c.priority("production_build.py", "uncategorized"), 1);
        assert_eq!(c.priority("deploy.sh", "deployment"), 2);
        assert_eq!(c.priority("checker.py", "validation"), 3);
        assert_eq!(c.priority("misc.py", "uncategorized"), 5);
    }

    #[test]
    fn secret_detection_by_name() {
        let s = KeywordSecretClassifier;
        assert!(s.is_secret("AWS_SECRET_ACCESS_KEY"));
        assert!(s.is_secret("api_token"));
        assert!(!s.is_secret("PATH"));
        assert!(!s.is_secret("DATABASE_URL"));
    }
}
