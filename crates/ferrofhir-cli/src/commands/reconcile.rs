//! The `reconcile` subcommand: scan offload storage for orphans.

use std::sync::Arc;

use anyhow::{Context, Result};
use ferrofhir_config::TenantConfigLoader;
use ferrofhir_core::TenantDatasourceKey;
use ferrofhir_db_postgres::{PostgresResourceIndex, create_pool};
use ferrofhir_reconcile::{ReconcileOptions, Reconciler};

use crate::cli::{Cli, ReconcileArgs};
use crate::commands::object_store_for;

pub async fn run(cli: &Cli, args: &ReconcileArgs) -> Result<()> {
    let loader = TenantConfigLoader::new(&cli.config_dir);
    let key = TenantDatasourceKey::new(&cli.tenant, &cli.datastore);

    let bulk = loader
        .load_bulkdata(&cli.tenant)
        .context("loading bulk data configuration")?;
    let provider = bulk.provider(&args.source)?.clone();
    let datasource = loader
        .load_datasource(&key)
        .with_context(|| format!("loading datasource configuration for {key}"))?;

    let pool = create_pool(&datasource).await?;
    let reconciler = Reconciler::new(
        object_store_for(&provider)?,
        Arc::new(PostgresResourceIndex::new(pool)),
        provider.container.clone(),
        None,
    );

    // Deletion is opt-in: anything short of an explicit --confirm scans
    // in dry-run mode.
    let options = ReconcileOptions {
        continuation_token: args.continuation_token.clone(),
        max_scan_seconds: args.max_scan_seconds,
        page_size: args.page_size,
        dry_run: !args.confirm,
    };

    let summary = reconciler.run(&options).await?;

    println!(
        "scanned={} orphans={} deleted={} dry_run={}",
        summary.scanned, summary.orphans, summary.deleted, options.dry_run
    );
    if let Some(token) = &summary.continuation {
        println!("continuation-token={token}");
    }
    Ok(())
}
