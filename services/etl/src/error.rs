//! Error types for the work-tracking pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Unified error type for the pipeline.
///
/// Every class is fatal for the run. Nothing is retried inside the pipeline;
/// the caller may re-run the whole thing since every step is deterministic.
#[derive(Error, Debug)]
pub enum EtlError {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Input errors (20-29)
    #[error("failed to read {path}: {source}")]
    InputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed extract '{extract}': {source}")]
    MalformedInput {
        extract: String,
        #[source]
        source: csv::Error,
    },

    #[error("extract '{extract}' is missing expected columns: {columns:?}")]
    MissingInputColumns { extract: String, columns: Vec<String> },

    // Transform errors (30-39)
    #[error("transform failed: {0}")]
    Transform(String),

    // Validation errors (40-49)
    #[error("schema validation failed: {0}")]
    SchemaValidation(#[from] SchemaError),

    // Warehouse errors (50-59)
    #[error("failed to provision {object}: {source}")]
    Provision {
        object: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to load {table}: {source}")]
    Load {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("warehouse rejected {table}: {reason}")]
    LoadRejected { table: String, reason: String },
}

impl EtlError {
    /// Returns the error code for this error type.
    pub fn code(&self) -> u32 {
        match self {
            EtlError::Config(_) => 10,
            EtlError::InputIo { .. } => 20,
            EtlError::MalformedInput { .. } => 21,
            EtlError::MissingInputColumns { .. } => 22,
            EtlError::Transform(_) => 30,
            EtlError::SchemaValidation(_) => 40,
            EtlError::Provision { .. } => 50,
            EtlError::Load { .. } => 51,
            EtlError::LoadRejected { .. } => 52,
        }
    }

    pub(crate) fn transform(message: impl Into<String>) -> Self {
        EtlError::Transform(message.into())
    }
}

/// A table that does not match its expected schema.
///
/// Validation stops at the first violation, so each error names exactly one
/// problem for one table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table '{table}' is missing columns: {columns:?}")]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("column '{column}' of '{table}' has incorrect type: expected {expected}, got {actual}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },

    #[error("column '{column}' of '{table}' is not nullable but holds {nulls} null value(s)")]
    UnexpectedNull {
        table: String,
        column: String,
        nulls: usize,
    },

    #[error("primary key '{column}' of '{table}' repeats value '{key}' in {rows} rows")]
    DuplicateKey {
        table: String,
        column: String,
        key: String,
        rows: usize,
    },

    #[error("no expected schema registered for table '{0}'")]
    UnknownTable(String),
}

impl SchemaError {
    /// The table this error was raised for.
    pub fn table(&self) -> &str {
        match self {
            SchemaError::MissingColumns { table, .. }
            | SchemaError::TypeMismatch { table, .. }
            | SchemaError::UnexpectedNull { table, .. }
            | SchemaError::DuplicateKey { table, .. } => table,
            SchemaError::UnknownTable(table) => table,
        }
    }
}
