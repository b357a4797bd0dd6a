use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use opsvault_catalog::{preserve_well_known, Catalog, CatalogConfig, PlanPhaseRecord, Scanner};
use opsvault_engine::{
    ActionSet, Ledger, Orchestrator, ReadinessInputs, RecoveryReport, ScoreCard,
};
use opsvault_plan::Plan;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

/// Exit code for a fully successful invocation.
const EXIT_OK: i32 = 0;
/// Exit code when the invocation completed but not everything succeeded.
const EXIT_PARTIAL: i32 = 1;
/// Exit code for invocation-level failures (bad plan, storage unavailable).
const EXIT_FATAL: i32 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn cli() -> Command {
    Command::new("opsvault")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Asset preservation catalog and phased recovery orchestration")
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .default_value("opsvault.db")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the catalog database"),
        )
        .subcommand(
            Command::new("preserve")
                .about("Scan a workspace and preserve its scripts and configs")
                .arg(
                    Arg::new("path")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Workspace root to scan"),
                )
                .arg(
                    Arg::new("category")
                        .long("category")
                        .help("Force every scanned asset into this category"),
                )
                .arg(
                    Arg::new("env")
                        .long("env")
                        .action(ArgAction::Append)
                        .help("Also preserve this environment variable (repeatable)"),
                )
                .arg(
                    Arg::new("no-env-capture")
                        .long("no-env-capture")
                        .action(ArgAction::SetTrue)
                        .help("Skip the well-known environment variable capture"),
                ),
        )
        .subcommand(
            Command::new("recover")
                .about("Execute the recovery plan against the preserved catalog")
                .arg(
                    Arg::new("plan")
                        .long("plan")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON plan file; defaults to the built-in seven-phase plan"),
                )
                .arg(
                    Arg::new("ledger")
                        .long("ledger")
                        .default_value("opsvault-ledger.db")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the execution ledger database"),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .default_value("recovery_report.json")
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to write the JSON recovery report"),
                )
                .arg(
                    Arg::new("max-priority")
                        .long("max-priority")
                        .default_value("10")
                        .value_parser(value_parser!(u8).range(1..=10))
                        .help("Mark assets at or below this priority tested after success"),
                )
                .arg(
                    Arg::new("validate-only")
                        .long("validate-only")
                        .action(ArgAction::SetTrue)
                        .help("Run only validation probes; no run or rollback commands"),
                ),
        )
        .subcommand(
            Command::new("score")
                .about("Compute the recovery readiness score")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the full breakdown as JSON"),
                ),
        )
}

async fn run() -> anyhow::Result<i32> {
    let matches = cli().get_matches();
    let db: &PathBuf = matches
        .get_one("db")
        .context("missing --db value")?;

    match matches.subcommand() {
        Some(("preserve", args)) => {
            let root: &PathBuf = args.get_one("path").context("missing path")?;
            let catalog = open_catalog(db)?;

            let mut scanner = Scanner::new();
            if let Some(category) = args.get_one::<String>("category") {
                scanner = scanner.with_category(category.clone());
            }
            let summary = scanner
                .scan(&catalog, root)
                .with_context(|| format!("scanning {}", root.display()))?;

            if !args.get_flag("no-env-capture") {
                let captured = preserve_well_known(&catalog, |name| std::env::var(name).ok())?;
                println!("captured {captured} well-known env var(s)");
            }
            for name in args.get_many::<String>("env").unwrap_or_default() {
                match std::env::var(name) {
                    Ok(value) => {
                        let priority = if catalog.is_secret_name(name) { 1 } else { 2 };
                        let var = catalog.preserve_env_var(name, &value, priority, "")?;
                        println!("preserved env {} ({})", var.name,
                            if var.is_secret { "masked" } else { "plain" });
                    }
                    Err(_) => eprintln!("env {name} is not set; skipped"),
                }
            }

            println!("preserved {} asset(s)", summary.preserved);
            for (category, count) in catalog.category_breakdown()? {
                println!("  {category:<20} {count}");
            }
            if !summary.skipped.is_empty() {
                println!("skipped {} asset(s):", summary.skipped.len());
                for path in &summary.skipped {
                    println!("  {path}");
                }
                return Ok(EXIT_PARTIAL);
            }
            Ok(EXIT_OK)
        }

        Some(("recover", args)) => {
            let catalog = open_catalog(db)?;
            let plan = load_plan(args.get_one::<PathBuf>("plan"))?;
            let ledger_path: &PathBuf = args.get_one("ledger").context("missing --ledger")?;
            let report_path: &PathBuf = args.get_one("report").context("missing --report")?;
            let max_priority = *args.get_one::<u8>("max-priority").context("missing priority")?;
            let validate_only = args.get_flag("validate-only");

            record_plan(&catalog, &plan)?;

            let actions = ActionSet::from_plan(&plan);
            let ledger = Ledger::open(ledger_path)
                .with_context(|| format!("opening ledger {}", ledger_path.display()))?;
            let orchestrator =
                Orchestrator::new(plan.clone(), actions, ledger).validate_only(validate_only);

            let cancel = orchestrator.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("interrupt received; finishing current attempt then stopping");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let result = orchestrator.run().await.context("recovery run failed")?;
            let success = result.success(&plan);

            if success && !validate_only {
                let marked = catalog.mark_tested(max_priority)?;
                tracing::info!(marked, "assets marked tested");
            }

            let readiness = ScoreCard::standard().score(&catalog.stats()?.into());
            let report = RecoveryReport::build(&plan, &result, orchestrator.ledger(), Some(readiness))?;
            report.write_to(report_path)?;

            for phase in &result.phases {
                println!("{:<28} {}", phase.id, phase.state);
            }
            println!(
                "succeeded: {}  failed: {}  rolled back: {}  skipped: {}",
                result.in_state(opsvault_engine::PhaseState::Succeeded).len(),
                result.in_state(opsvault_engine::PhaseState::Failed).len(),
                result.in_state(opsvault_engine::PhaseState::RolledBack).len(),
                result.in_state(opsvault_engine::PhaseState::Skipped).len(),
            );
            if let Some(readiness) = &report.readiness {
                println!("readiness: {:.1}/100", readiness.score);
            }
            println!(
                "run {} finished in {} ms; report written to {}",
                result.run_id,
                result.elapsed().num_milliseconds(),
                report_path.display()
            );

            if success && result.all_succeeded() && !result.cancelled {
                Ok(EXIT_OK)
            } else if success {
                Ok(EXIT_PARTIAL)
            } else {
                println!("recovery incomplete: a critical phase did not succeed");
                Ok(EXIT_FATAL)
            }
        }

        Some(("score", args)) => {
            let catalog = open_catalog(db)?;
            let inputs = ReadinessInputs::from(catalog.stats()?);
            let report = ScoreCard::standard().score(&inputs);

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("readiness: {:.1}/100", report.score);
                for factor in &report.factors {
                    let mark = if factor.satisfied { "ok " } else { "gap" };
                    println!("  [{mark}] {:<26} {:>3}", factor.name, factor.weight);
                }
            }
            Ok(EXIT_OK)
        }

        _ => Ok(EXIT_FATAL),
    }
}

fn open_catalog(path: &Path) -> anyhow::Result<Catalog> {
    Catalog::open(path, CatalogConfig::default())
        .with_context(|| format!("opening catalog {}", path.display()))
}

fn load_plan(path: Option<&PathBuf>) -> anyhow::Result<Plan> {
    match path {
        Some(path) => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("reading plan {}", path.display()))?;
            Plan::from_json(&body).with_context(|| format!("validating plan {}", path.display()))
        }
        None => Ok(Plan::builtin()),
    }
}

fn record_plan(catalog: &Catalog, plan: &Plan) -> anyhow::Result<()> {
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
    catalog.record_plan(&records)?;
    Ok(())
}
