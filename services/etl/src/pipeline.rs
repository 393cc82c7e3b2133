//! Run orchestration.
//!
//! provision -> load extracts -> dimensions -> fact -> validate -> load.
//! Validation of every table happens before the first load is submitted, so a
//! failed run never leaves a partial load behind.

use crate::config::PipelineConfig;
use crate::dimension::build_dimensions;
use crate::error::{EtlError, Result, SchemaError};
use crate::fact::build_fact;
use crate::loader::load_datasets;
use crate::schema::{schema_for, CATALOG};
use crate::table::Table;
use crate::validate::validate_all;
use crate::warehouse::Warehouse;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Upper bound on warehouse requests in flight at once.
pub const WAREHOUSE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Provision, transform, validate and load.
    #[default]
    Full,
    /// Create the dataset and tables, then stop.
    ProvisionOnly,
    /// Assume the tables exist.
    SkipProvision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoad {
    pub table: String,
    pub rows: usize,
    pub accepted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub tables: Vec<TableLoad>,
}

impl RunSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// Rows the warehouse actually wrote.
    pub fn total_accepted(&self) -> u64 {
        self.tables.iter().map(|t| t.accepted).sum()
    }
}

/// Create the dataset and every catalog table if absent.
pub async fn provision(warehouse: &dyn Warehouse) -> Result<()> {
    warehouse.ensure_dataset().await?;

    stream::iter(CATALOG.iter().map(Ok::<_, EtlError>))
        .try_for_each_concurrent(WAREHOUSE_CONCURRENCY, |schema| async move {
            warehouse.ensure_table(schema).await.map(|_| ())
        })
        .await?;

    info!(tables = CATALOG.len(), "warehouse provisioned");
    Ok(())
}

/// Read both extracts and build every output table: the six dimensions in
/// load order followed by the fact table.
pub fn transform(config: &PipelineConfig) -> Result<Vec<Table>> {
    let (allocation, task_log) = load_datasets(&config.allocation_path, &config.task_log_path)?;
    let dims = build_dimensions(&allocation, &task_log, config.calendar_start, config.calendar_end)?;
    let fact = build_fact(&allocation, &task_log, &dims)?;

    let mut tables = dims.to_tables();
    tables.push(fact);
    Ok(tables)
}

/// Load already validated tables, a bounded number at a time.
pub async fn load(warehouse: &dyn Warehouse, tables: &[Table]) -> Result<Vec<TableLoad>> {
    stream::iter(tables)
        .map(|table| async move {
            let schema =
                schema_for(table.name()).ok_or_else(|| SchemaError::UnknownTable(table.name().to_string()))?;
            let accepted = warehouse.load_table(table, schema).await?;
            Ok::<_, EtlError>(TableLoad {
                table: table.name().to_string(),
                rows: table.row_count(),
                accepted,
            })
        })
        .buffered(WAREHOUSE_CONCURRENCY)
        .try_collect()
        .await
}

async fn execute(config: &PipelineConfig, warehouse: &dyn Warehouse, mode: RunMode, run_id: Uuid) -> Result<RunSummary> {
    if mode != RunMode::SkipProvision {
        provision(warehouse).await?;
    }
    if mode == RunMode::ProvisionOnly {
        return Ok(RunSummary {
            run_id,
            tables: Vec::new(),
        });
    }

    let tables = transform(config)?;
    validate_all(&tables)?;
    let loaded = load(warehouse, &tables).await?;

    Ok(RunSummary { run_id, tables: loaded })
}

/// Execute one run against `warehouse`. The handle is closed before this
/// returns, whatever the outcome.
pub async fn run(config: &PipelineConfig, warehouse: &dyn Warehouse, mode: RunMode) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let span = info_span!("etl_run", %run_id, ?mode);

    async {
        info!("run started");
        let result = execute(config, warehouse, mode, run_id).await;
        match &result {
            Ok(summary) => info!(
                tables = summary.tables.len(),
                rows = summary.total_rows(),
                accepted = summary.total_accepted(),
                "run finished"
            ),
            Err(e) => error!(code = e.code(), error = %e, "run failed"),
        }
        warehouse.close().await;
        result
    }
    .instrument(span)
    .await
}
