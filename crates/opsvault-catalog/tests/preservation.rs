//! End-to-end preservation flow: scan a workspace into a durable catalog,
//! re-scan, and read back scoring inputs.

use opsvault_catalog::{AssetKind, Catalog, CatalogConfig, PlanPhaseRecord, Scanner, MASK_TOKEN};
use std::path::Path;

fn write(dir: &Path, rel: &str, content: &[u8]) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn scan_is_idempotent_across_runs() {
    let workspace = tempfile::tempdir().unwrap();
    write(workspace.path(), "main.py", b"import db\nrun()\n");
    write(workspace.path(), "config/settings.json", b"{\"debug\": false}\n");
    write(workspace.path(), "requirements.txt", b"flask==3.0\n");

    let db = tempfile::tempdir().unwrap();
    let db_path = db.path().join("catalog.db");

    let catalog = Catalog::open(&db_path, CatalogConfig::default()).unwrap();
    let first = Scanner::new().scan(&catalog, workspace.path()).unwrap();
    assert_eq!(first.preserved, 3);

    let before = catalog.get_by_path("main.py").unwrap().unwrap();

    // Unchanged workspace: rows untouched, timestamps stable.
    let second = Scanner::new().scan(&catalog, workspace.path()).unwrap();
    assert_eq!(second.preserved, 3);
    let after = catalog.get_by_path("main.py").unwrap().unwrap();
    assert_eq!(before.hash, after.hash);
    assert_eq!(before.updated_at, after.updated_at);

    // Edit one file: only its hash moves.
    write(workspace.path(), "main.py", b"import db\nrun()\nrun_again()\n");
    Scanner::new().scan(&catalog, workspace.path()).unwrap();
    let edited = catalog.get_by_path("main.py").unwrap().unwrap();
    assert_ne!(before.hash, edited.hash);
    assert!(edited.updated_at >= before.updated_at);
}

#[test]
fn five_asset_workspace_round_trips_unchanged() {
    let workspace = tempfile::tempdir().unwrap();
    for (name, body) in [
        ("alpha.py", "import json\n"),
        ("beta.py", "import csv\n"),
        ("gamma.py", "import re\n"),
        ("one.json", "{\"a\": 1}\n"),
        ("two.json", "{\"b\": 2}\n"),
    ] {
        write(workspace.path(), name, body.as_bytes());
    }

    let catalog = Catalog::open_in_memory(CatalogConfig::default()).unwrap();
    Scanner::new().scan(&catalog, workspace.path()).unwrap();

    let first = catalog.list_by_priority(10).unwrap();
    assert_eq!(first.len(), 5);
    assert_eq!(first.iter().filter(|a| a.kind == AssetKind::Script).count(), 3);

    Scanner::new().scan(&catalog, workspace.path()).unwrap();
    let second = catalog.list_by_priority(10).unwrap();
    assert_eq!(second.len(), 5);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.updated_at, b.updated_at);
    }
}

#[test]
fn catalog_survives_reopen() {
    let workspace = tempfile::tempdir().unwrap();
    write(workspace.path(), "backup_restore.sh", b"#!/bin/sh\nrsync -a src dst\n");

    let db = tempfile::tempdir().unwrap();
    let db_path = db.path().join("catalog.db");

    {
        let catalog = Catalog::open(&db_path, CatalogConfig::default()).unwrap();
        Scanner::new().scan(&catalog, workspace.path()).unwrap();
        catalog.preserve_env_var("DB_PASSWORD", "p4ss", 1, "primary db").unwrap();
    }

    let reopened = Catalog::open(&db_path, CatalogConfig::default()).unwrap();
    let asset = reopened.get_by_path("backup_restore.sh").unwrap().unwrap();
    assert_eq!(asset.kind, AssetKind::Script);
    assert_eq!(asset.category, "backup");

    let vars = reopened.env_vars().unwrap();
    assert_eq!(vars.len(), 1);
    assert_eq!(vars[0].value, MASK_TOKEN);
}

#[test]
fn stats_feed_the_readiness_scorer() {
    let workspace = tempfile::tempdir().unwrap();
    write(workspace.path(), "deploy.py", b"import os\n");
    write(workspace.path(), "monitor.py", b"check()\n");
    write(workspace.path(), "app.toml", b"[app]\n");

    let catalog = Catalog::open_in_memory(CatalogConfig::default()).unwrap();
    Scanner::new().scan(&catalog, workspace.path()).unwrap();
    catalog.preserve_env_var("REGION", "eu-west-1", 3, "").unwrap();
    catalog
        .record_plan(&[
            PlanPhaseRecord {
                id: "environment".into(),
                exec_order: 1,
                dependencies: vec![],
                critical: true,
                retry_limit: 3,
                timeout_secs: 120,
            },
            PlanPhaseRecord {
                id: "database".into(),
                exec_order: 2,
                dependencies: vec!["environment".into()],
                critical: true,
                retry_limit: 3,
                timeout_secs: 300,
            },
        ])
        .unwrap();

    let stats = catalog.stats().unwrap();
    assert_eq!(stats.script_count, 2);
    assert_eq!(stats.config_count, 1);
    assert_eq!(stats.env_var_count, 1);
    assert_eq!(stats.phase_count, 2);
    assert!(!stats.has_dependency_manifest);

    catalog.mark_tested(10).unwrap();
    let stats = catalog.stats().unwrap();
    assert_eq!(stats.tested_script_count, 2);
}
