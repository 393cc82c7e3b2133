//! ETL Service - loads work-tracking extracts into the warehouse star schema
//!
//! Responsibilities:
//! - Provision the warehouse dataset and tables
//! - Read the allocation and task-log CSV extracts
//! - Build dimensions and the work-tracking fact table
//! - Validate every table before anything is loaded

use anyhow::{Context, Result};
use clap::Parser;
use etl::config::{FileConfig, Overrides, PipelineConfig, WarehouseConfig};
use etl::pipeline::{self, RunMode, RunSummary};
use etl::warehouse::{MemoryWarehouse, PgWarehouse, Warehouse};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "etl", about = "Loads work-tracking extracts into the warehouse")]
struct Args {
    /// Run config with the extract paths
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,

    /// Allocation extract, overrides the config file
    #[arg(long)]
    allocation: Option<PathBuf>,

    /// Task-log extract, overrides the config file
    #[arg(long)]
    task_log: Option<PathBuf>,

    /// Dry run - transform and validate in memory, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Create the dataset and tables, then exit
    #[arg(long, default_value = "false", conflicts_with = "skip_provision")]
    provision_only: bool,

    /// Assume the dataset and tables already exist
    #[arg(long, default_value = "false")]
    skip_provision: bool,
}

impl Args {
    fn mode(&self) -> RunMode {
        if self.provision_only {
            RunMode::ProvisionOnly
        } else if self.skip_provision {
            RunMode::SkipProvision
        } else {
            RunMode::Full
        }
    }
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
            )
            .init();
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!("\nRun: {}", summary.run_id);
    for table in &summary.tables {
        println!(
            "  {:<20} {:>8} built {:>8} written",
            table.table, table.rows, table.accepted
        );
    }
    println!(
        "Total: {} rows built, {} written in {} tables",
        summary.total_rows(),
        summary.total_accepted(),
        summary.tables.len()
    );
    if dry_run {
        println!("\nDry run - nothing written to the warehouse");
    }
}

/// Dry runs never read the warehouse settings.
async fn open_warehouse(dry_run: bool, dataset: Option<&str>) -> Result<Box<dyn Warehouse>> {
    if dry_run {
        return Ok(Box::new(MemoryWarehouse::new()));
    }

    let warehouse_config = WarehouseConfig::from_env(dataset)?;
    println!("Dataset: {}", warehouse_config.namespace);
    let warehouse = PgWarehouse::connect(
        warehouse_config.require_db_url()?,
        &warehouse_config.namespace,
        warehouse_config.max_connections,
    )
    .await
    .context("Failed to connect to warehouse")?;
    Ok(Box::new(warehouse))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let mode = args.mode();

    let file = if args.config.exists() {
        FileConfig::from_file(&args.config)?
    } else {
        tracing::warn!(path = %args.config.display(), "config file not found, using flags only");
        FileConfig::default()
    };
    let overrides = Overrides {
        allocation_path: args.allocation.clone(),
        task_log_path: args.task_log.clone(),
    };
    let config = PipelineConfig::resolve(&file, &overrides)?;

    println!("=== Work Tracking ETL ===");
    println!("Allocation: {}", config.allocation_path.display());
    println!("Task log:   {}", config.task_log_path.display());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let warehouse = open_warehouse(args.dry_run, file.dataset.as_deref()).await?;

    let summary = pipeline::run(&config, warehouse.as_ref(), mode)
        .await
        .context("ETL run failed")?;
    print_summary(&summary, args.dry_run);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_ignores_warehouse_settings() {
        std::env::set_var("DB_MAX_CONNECTIONS", "zero");
        std::env::remove_var("DB_URL");

        assert!(open_warehouse(true, None).await.is_ok());
        assert!(open_warehouse(false, None).await.is_err());
    }

    #[test]
    fn test_provision_flags_conflict() {
        assert!(Args::try_parse_from(["etl", "--provision-only", "--skip-provision"]).is_err());
        let args = Args::try_parse_from(["etl", "--dry-run", "--skip-provision"]).unwrap();
        assert_eq!(args.mode(), RunMode::SkipProvision);
    }
}
