//! Warehouse gateway - table provisioning and columnar loads.
//!
//! The handle is acquired once per run and passed explicitly; it is never
//! global state. `PgWarehouse` targets Postgres (a schema stands in for the
//! warehouse dataset). `MemoryWarehouse` keeps loaded tables in memory for
//! dry runs and tests.

use crate::error::{EtlError, Result};
use crate::schema::{quote_ident, TableSchema};
use crate::table::{ColumnData, Table};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, QueryBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Postgres accepts at most this many bind parameters per statement.
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Rows per INSERT statement upper bound.
const MAX_BATCH_ROWS: usize = 1000;

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the dataset if absent. Returns `true` if it was created.
    async fn ensure_dataset(&self) -> Result<bool>;

    /// Create a table if absent. Returns `true` if it was created.
    async fn ensure_table(&self, schema: &TableSchema) -> Result<bool>;

    /// Load every row of `table` using its declared schema. Returns the
    /// number of rows the warehouse accepted.
    async fn load_table(&self, table: &Table, schema: &TableSchema) -> Result<u64>;

    /// Release the handle.
    async fn close(&self);
}

/// Columns of `table` in schema order. Loads never autodetect.
fn columns_in_schema_order<'a>(table: &'a Table, schema: &TableSchema) -> Result<Vec<&'a ColumnData>> {
    schema
        .fields
        .iter()
        .map(|f| {
            table.column(f.name).ok_or_else(|| EtlError::LoadRejected {
                table: schema.name.to_string(),
                reason: format!("column '{}' is missing", f.name),
            })
        })
        .collect()
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgWarehouse {
    pool: PgPool,
    namespace: String,
}

impl PgWarehouse {
    pub async fn connect(db_url: &str, namespace: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .map_err(|source| EtlError::Provision {
                object: "database connection".to_string(),
                source,
            })?;

        info!(namespace, "connected to warehouse");
        Ok(Self {
            pool,
            namespace: namespace.to_string(),
        })
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)",
        )
        .bind(&self.namespace)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|source| EtlError::Provision {
            object: name.to_string(),
            source,
        })?;
        Ok(exists)
    }
}

fn push_cell(row: &mut Separated<'_, '_, Postgres, &'static str>, data: &ColumnData, idx: usize) {
    match data {
        ColumnData::Utf8(v) => row.push_bind(v[idx].clone()),
        ColumnData::Int32(v) => row.push_bind(v[idx].map(i64::from)),
        ColumnData::Int64(v) => row.push_bind(v[idx]),
        ColumnData::Float64(v) => row.push_bind(v[idx]),
        ColumnData::Boolean(v) => row.push_bind(v[idx]),
        ColumnData::Date(v) => row.push_bind(v[idx]),
    };
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn ensure_dataset(&self) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)")
                .bind(&self.namespace)
                .fetch_one(&self.pool)
                .await
                .map_err(|source| EtlError::Provision {
                    object: self.namespace.clone(),
                    source,
                })?;

        if exists {
            info!(dataset = %self.namespace, "dataset already exists");
            return Ok(false);
        }

        warn!(dataset = %self.namespace, "dataset not found, creating");
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.namespace)))
            .execute(&self.pool)
            .await
            .map_err(|source| EtlError::Provision {
                object: self.namespace.clone(),
                source,
            })?;
        info!(dataset = %self.namespace, "dataset created");
        Ok(true)
    }

    async fn ensure_table(&self, schema: &TableSchema) -> Result<bool> {
        if self.table_exists(schema.name).await? {
            warn!(table = schema.name, "table already exists");
            return Ok(false);
        }

        for statement in schema.create_table_sql(&self.namespace) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|source| EtlError::Provision {
                    object: schema.name.to_string(),
                    source,
                })?;
        }
        info!(table = schema.name, "table created");
        Ok(true)
    }

    async fn load_table(&self, table: &Table, schema: &TableSchema) -> Result<u64> {
        let columns = columns_in_schema_order(table, schema)?;
        let rows = table.row_count();
        let load_err = |source: sqlx::Error| EtlError::Load {
            table: schema.name.to_string(),
            source,
        };

        let column_list: Vec<String> = schema.fields.iter().map(|f| quote_ident(f.name)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) ",
            schema.qualified_name(&self.namespace),
            column_list.join(", ")
        );
        let conflict = format!(" ON CONFLICT ({}) DO NOTHING", quote_ident(schema.primary_key));
        let batch_rows = (MAX_BIND_PARAMS / columns.len().max(1)).clamp(1, MAX_BATCH_ROWS);

        let mut tx = self.pool.begin().await.map_err(load_err)?;
        let mut accepted = 0u64;

        for start in (0..rows).step_by(batch_rows) {
            let end = (start + batch_rows).min(rows);
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert);
            builder.push_values(start..end, |mut row, idx| {
                for data in &columns {
                    push_cell(&mut row, data, idx);
                }
            });
            builder.push(&conflict);

            let result = builder.build().execute(&mut *tx).await.map_err(load_err)?;
            accepted += result.rows_affected();
        }

        tx.commit().await.map_err(load_err)?;

        if accepted < rows as u64 {
            warn!(
                table = schema.name,
                rows,
                accepted,
                "some rows already present, skipped on conflict"
            );
        }
        info!(table = schema.name, rows = accepted, "table loaded");
        Ok(accepted)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("warehouse connection closed");
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Default)]
struct MemoryState {
    datasets: BTreeSet<String>,
    tables: BTreeSet<String>,
    loaded: BTreeMap<String, Table>,
}

/// Warehouse that keeps everything in memory.
#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<MemoryState>,
    closed: AtomicBool,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The last table loaded under `name`.
    pub fn loaded(&self, name: &str) -> Option<Table> {
        self.state().loaded.get(name).cloned()
    }

    pub fn loaded_names(&self) -> Vec<String> {
        self.state().loaded.keys().cloned().collect()
    }

    pub fn provisioned_tables(&self) -> Vec<String> {
        self.state().tables.iter().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_dataset(&self) -> Result<bool> {
        Ok(self.state().datasets.insert("memory".to_string()))
    }

    async fn ensure_table(&self, schema: &TableSchema) -> Result<bool> {
        let created = self.state().tables.insert(schema.name.to_string());
        if !created {
            warn!(table = schema.name, "table already exists");
        }
        Ok(created)
    }

    async fn load_table(&self, table: &Table, schema: &TableSchema) -> Result<u64> {
        columns_in_schema_order(table, schema)?;
        let rows = table.row_count() as u64;
        self.state().loaded.insert(schema.name.to_string(), table.clone());
        Ok(rows)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
