// Contractor Registry Reconciliation - CLI
// reconcile <id>   - reconcile one identifier against the registries
// import <csv>     - reconcile every identifier listed in a CSV file
// revalidate       - force-refresh every persisted record

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use contractor_registry::{
    ContractorStore, DataGovClient, EngineConfig, ReconcileEngine, ReconcileError,
    ReconcileOptions, Reconciliation,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contractor_registry=info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("reconcile") => {
            let id = args.get(2).context("usage: reconcile <company-id> [--force]")?;
            let force = args.iter().any(|a| a == "--force");
            run_reconcile(id, force).await
        }
        Some("import") => {
            let path = args.get(2).context("usage: import <file.csv>")?;
            run_import(path).await
        }
        Some("revalidate") => run_revalidate().await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("contractor-registry {}", contractor_registry::VERSION);
    println!();
    println!("Usage:");
    println!("  contractor-registry reconcile <company-id> [--force]");
    println!("  contractor-registry import <file.csv>");
    println!("  contractor-registry revalidate");
    println!();
    println!("Environment:");
    println!("  CONTRACTOR_DB           SQLite path (default: contractors.db)");
    println!("  REGISTRY_BASE_URL       datastore API base URL");
    println!("  REGISTRY_TIMEOUT_SECS   per-request timeout");
}

fn build_engine() -> Result<ReconcileEngine<DataGovClient>> {
    let cfg = EngineConfig::from_env();
    let store = ContractorStore::open(&cfg.db_path)
        .with_context(|| format!("failed to open store at {}", cfg.db_path))?;
    let client = DataGovClient::new(cfg).context("failed to build registry client")?;
    Ok(ReconcileEngine::new(store, client))
}

async fn run_reconcile(id: &str, force: bool) -> Result<()> {
    let engine = build_engine()?;

    let opts = ReconcileOptions {
        force_refresh: force,
        deadline: Some(Duration::from_secs(45)),
    };

    match engine.reconcile(id, &opts).await {
        Ok(Some(result)) => {
            print_reconciliation(&result);
            Ok(())
        }
        Ok(None) => {
            println!("ℹ️  {} is valid but not present in either registry yet", id);
            Ok(())
        }
        Err(ReconcileError::InvalidIdentifier(reason)) => {
            eprintln!("❌ Invalid identifier: {}", reason);
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

fn print_reconciliation(result: &Reconciliation) {
    let record = &result.record;

    println!("✓ Outcome: {}", result.outcome.as_str());
    if let Some(notice) = &result.notice {
        println!("  Notice: {}", notice);
    }
    println!("  Company:   {} ({})", record.company_id, record.name.as_deref().unwrap_or("-"));
    if let Some(company_type) = record.company_type {
        println!("  Type:      {}", company_type.as_str());
    }
    println!("  Indicator: {}", record.status_indicator.as_str());
    println!("  Licenses:  {}", record.licenses.len());
    for license in &record.licenses {
        println!(
            "    - {} {} ({})",
            license.classification_type,
            license.classification_code,
            license.description.as_deref().unwrap_or("-")
        );
    }
}

/// Reconcile every identifier listed in a CSV file. The file may have a
/// `company_id` header column; otherwise the first column is used.
async fn run_import(path: &str) -> Result<()> {
    println!("📂 Importing identifiers from {}...", path);

    let mut reader = csv::Reader::from_path(path).context("failed to open CSV file")?;

    let id_column = reader
        .headers()
        .ok()
        .and_then(|headers| headers.iter().position(|h| h == "company_id"))
        .unwrap_or(0);

    let ids: Vec<String> = reader
        .records()
        .filter_map(|record| record.ok())
        .filter_map(|record| record.get(id_column).map(str::to_string))
        .filter(|id| !id.trim().is_empty())
        .collect();

    println!("✓ Found {} identifiers", ids.len());

    let engine = build_engine()?;
    let opts = ReconcileOptions::default();

    let mut created = 0;
    let mut loaded = 0;
    let mut refreshed = 0;
    let mut not_found = 0;
    let mut failed = 0;

    for id in &ids {
        match engine.reconcile(id, &opts).await {
            Ok(Some(result)) => match result.outcome {
                contractor_registry::ReconcileOutcome::Created => created += 1,
                contractor_registry::ReconcileOutcome::LoadedExisting => loaded += 1,
                contractor_registry::ReconcileOutcome::Refreshed => refreshed += 1,
            },
            Ok(None) => not_found += 1,
            Err(err) => {
                eprintln!("⚠️  {}: {}", id, err);
                failed += 1;
            }
        }
    }

    println!("✓ Created: {}", created);
    println!("✓ Loaded existing: {}", loaded);
    println!("✓ Refreshed: {}", refreshed);
    println!("✓ Not found in registries: {}", not_found);
    if failed > 0 {
        println!("⚠️  Failed: {}", failed);
    }

    Ok(())
}

/// Force-refresh every persisted record, pausing between calls so the
/// registries are not hammered.
async fn run_revalidate() -> Result<()> {
    let cfg = EngineConfig::from_env();
    let engine = build_engine()?;

    let ids = engine.store().all_identifiers()?;
    println!("🔍 Revalidating {} persisted records...", ids.len());

    let opts = ReconcileOptions::forced();
    let mut updated = 0;
    let mut failed = 0;

    for id in &ids {
        match engine.reconcile(id, &opts).await {
            Ok(_) => updated += 1,
            Err(err) => {
                eprintln!("⚠️  {}: {}", id, err);
                failed += 1;
            }
        }

        tokio::time::sleep(Duration::from_millis(cfg.revalidate_delay_ms)).await;
    }

    println!("✓ Revalidation complete: {} updated, {} failed", updated, failed);

    Ok(())
}
