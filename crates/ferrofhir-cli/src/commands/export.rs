//! The `export` subcommand: run a bulk export job to completion.

use std::sync::Arc;

use anyhow::{Context, Result};
use ferrofhir_bulkdata::{ExportJob, JobExecution, JobParameters, TypeFilter, run_export};
use ferrofhir_config::TenantConfigLoader;
use ferrofhir_core::{TenantDatasourceKey, parse_instant};
use ferrofhir_db_postgres::{PostgresSearchBackend, create_pool};
use tracing::info;

use crate::cli::{Cli, ExportArgs};
use crate::commands::object_store_for;

pub async fn run(cli: &Cli, args: &ExportArgs) -> Result<()> {
    let loader = TenantConfigLoader::new(&cli.config_dir);
    let key = TenantDatasourceKey::new(&cli.tenant, &cli.datastore);

    let bulk = loader
        .load_bulkdata(&cli.tenant)
        .context("loading bulk data configuration")?;
    let provider = bulk.provider(&args.source)?.clone();
    let datasource = loader
        .load_datasource(&key)
        .with_context(|| format!("loading datasource configuration for {key}"))?;

    let type_filters = args
        .type_filters
        .iter()
        .map(|clause| TypeFilter::parse(clause))
        .collect::<Result<Vec<_>, _>>()?;

    let params = JobParameters {
        tenant_id: cli.tenant.clone(),
        datastore_id: cli.datastore.clone(),
        request_url: args.request_url.clone(),
        resource_types: args.types.clone(),
        since: args.since.as_deref().map(parse_instant).transpose()?,
        till: args.till.as_deref().map(parse_instant).transpose()?,
        type_filters,
        format: args.format.parse()?,
        source: args.source.clone(),
        path_prefix: args.path_prefix.clone(),
    };

    let pool = create_pool(&datasource).await?;
    let job = ExportJob {
        params,
        bulk,
        search: Arc::new(PostgresSearchBackend::new(pool)),
        store: object_store_for(&provider)?,
    };

    let mut execution = JobExecution::new();
    info!(job_id = %execution.job_id, "Starting export");

    match run_export(&job, &mut execution).await? {
        Some(exit_status) => println!("{exit_status}"),
        None => println!("nothing processed"),
    }
    Ok(())
}
