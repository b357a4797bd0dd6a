//! Readiness scoring against a live catalog, including the post-run
//! mark-tested lifecycle.

use opsvault_catalog::{AssetKind, Catalog, CatalogConfig, NewAsset, PlanPhaseRecord};
use opsvault_engine::{ReadinessInputs, ScoreCard};
use opsvault_plan::Plan;

fn preserve_scripts(catalog: &Catalog, count: usize) {
    for i in 0..count {
        catalog
            .preserve(NewAsset::new(
                format!("scripts/job_{i}.py"),
                format!("print({i})\n").into_bytes(),
                AssetKind::Script,
            ))
            .unwrap();
    }
}

fn record_builtin_plan(catalog: &Catalog) {
    let plan = Plan::builtin();
    let records: Vec<PlanPhaseRecord> = plan
        .phases()
        .iter()
        .map(|p| PlanPhaseRecord {
            id: p.id.clone(),
            exec_order: p.execution_order,
            dependencies: p.dependencies.clone(),
            critical: p.critical,
            retry_limit: p.retry_limit,
            timeout_secs: p.timeout().as_secs(),
        })
        .collect();
    catalog.record_plan(&records).unwrap();
}

#[test]
fn prepared_catalog_without_manifest_scores_ninety_five() {
    let catalog = Catalog::open_in_memory(CatalogConfig::default()).unwrap();
    preserve_scripts(&catalog, 5);
    catalog
        .preserve(NewAsset::new("app.yaml", b"debug: false\n".to_vec(), AssetKind::Configuration))
        .unwrap();
    catalog.preserve_env_var("DATABASE_URL", "sqlite:production.db", 1, "").unwrap();
    record_builtin_plan(&catalog);
    catalog.mark_tested(10).unwrap();

    let inputs = ReadinessInputs::from(catalog.stats().unwrap());
    let report = ScoreCard::standard().score(&inputs);

    assert_eq!(report.score, 95.0);
    assert_eq!(report.gaps(), vec!["dependencies_manifest"]);
}

#[test]
fn preserving_a_manifest_closes_the_gap() {
    let catalog = Catalog::open_in_memory(CatalogConfig::default()).unwrap();
    preserve_scripts(&catalog, 2);
    catalog
        .preserve(NewAsset::new(
            "requirements.txt",
            b"requests==2.32\n".to_vec(),
            AssetKind::Configuration,
        ))
        .unwrap();
    catalog.preserve_env_var("REGION", "eu-west-1", 3, "").unwrap();
    record_builtin_plan(&catalog);
    catalog.mark_tested(10).unwrap();

    let report = ScoreCard::standard().score(&catalog.stats().unwrap().into());
    assert_eq!(report.score, 100.0);
}

#[test]
fn empty_catalog_is_barely_ready() {
    let catalog = Catalog::open_in_memory(CatalogConfig::default()).unwrap();
    let report = ScoreCard::standard().score(&catalog.stats().unwrap().into());
    // Only the schema factor holds on a fresh catalog.
    assert_eq!(report.score, 10.0);
}

#[test]
fn untested_scripts_do_not_satisfy_the_scripts_factor() {
    let catalog = Catalog::open_in_memory(CatalogConfig::default()).unwrap();
    preserve_scripts(&catalog, 4);

    let report = ScoreCard::standard().score(&catalog.stats().unwrap().into());
    assert!(report.gaps().contains(&"scripts_preserved"));

    catalog.mark_tested(10).unwrap();
    let report = ScoreCard::standard().score(&catalog.stats().unwrap().into());
    assert!(!report.gaps().contains(&"scripts_preserved"));
}

#[test]
fn successful_run_marks_assets_tested() {
    let catalog = Catalog::open_in_memory(CatalogConfig::default()).unwrap();
    preserve_scripts(&catalog, 3);

    let before = catalog.stats().unwrap();
    assert_eq!(before.tested_script_count, 0);

    catalog.mark_tested(10).unwrap();
    let after = catalog.stats().unwrap();
    assert_eq!(after.tested_script_count, 3);
}
