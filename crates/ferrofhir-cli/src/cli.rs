//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// FerroFHIR bulk data operations.
#[derive(Debug, Parser)]
#[command(name = "ferrofhir", version, about = "FerroFHIR bulk data operations")]
pub struct Cli {
    /// Tenant configuration directory.
    #[arg(long, global = true, env = "FERROFHIR_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Tenant id.
    #[arg(long, global = true, default_value = "default")]
    pub tenant: String,

    /// Datastore id within the tenant.
    #[arg(long, global = true, default_value = "default")]
    pub datastore: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a bulk export job and print its exit status.
    Export(ExportArgs),
    /// Scan offload storage for orphaned payload records.
    Reconcile(ReconcileArgs),
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Comma-separated resource types to export.
    #[arg(long, value_delimiter = ',', required = true)]
    pub types: Vec<String>,

    /// Inclusive lower bound on last-modified (RFC3339).
    #[arg(long)]
    pub since: Option<String>,

    /// Exclusive upper bound on last-modified (RFC3339).
    #[arg(long)]
    pub till: Option<String>,

    /// typeFilter clause, e.g. "Patient?gender=female". Repeatable.
    #[arg(long = "type-filter")]
    pub type_filters: Vec<String>,

    /// Output format media type.
    #[arg(long, default_value = "application/fhir+ndjson")]
    pub format: String,

    /// Storage provider source id.
    #[arg(long, default_value = "default")]
    pub source: String,

    /// Key prefix inside the destination container.
    #[arg(long, default_value = "")]
    pub path_prefix: String,

    /// Originating request URL recorded in logs.
    #[arg(long, default_value = "")]
    pub request_url: String,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Storage provider source id.
    #[arg(long, default_value = "default")]
    pub source: String,

    /// Resume the scan after this token.
    #[arg(long)]
    pub continuation_token: Option<String>,

    /// Wall-clock budget for the scan.
    #[arg(long, default_value_t = 120)]
    pub max_scan_seconds: u64,

    /// Blob keys fetched per page.
    #[arg(long, default_value_t = 1000)]
    pub page_size: usize,

    /// Report orphans without deleting (the default behavior).
    #[arg(long, conflicts_with = "confirm")]
    pub dry_run: bool,

    /// Actually delete confirmed orphans.
    #[arg(long)]
    pub confirm: bool,
}
