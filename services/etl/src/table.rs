//! In-memory columnar tables produced by the transform stage.
//!
//! Each column carries its physical storage type. The validator compares that
//! type against the logical type a warehouse table expects.

use chrono::NaiveDate;
use std::fmt;

/// Storage type of a column as it was actually built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Utf8,
    Int32,
    Int64,
    Float64,
    Boolean,
    Date,
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhysicalType::Utf8 => "utf8",
            PhysicalType::Int32 => "int32",
            PhysicalType::Int64 => "int64",
            PhysicalType::Float64 => "float64",
            PhysicalType::Boolean => "boolean",
            PhysicalType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Column values. `None` is a null cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Utf8(Vec<Option<String>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnData {
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            ColumnData::Utf8(_) => PhysicalType::Utf8,
            ColumnData::Int32(_) => PhysicalType::Int32,
            ColumnData::Int64(_) => PhysicalType::Int64,
            ColumnData::Float64(_) => PhysicalType::Float64,
            ColumnData::Boolean(_) => PhysicalType::Boolean,
            ColumnData::Date(_) => PhysicalType::Date,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Utf8(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        fn count<T>(values: &[Option<T>]) -> usize {
            values.iter().filter(|v| v.is_none()).count()
        }
        match self {
            ColumnData::Utf8(v) => count(v),
            ColumnData::Int32(v) => count(v),
            ColumnData::Int64(v) => count(v),
            ColumnData::Float64(v) => count(v),
            ColumnData::Boolean(v) => count(v),
            ColumnData::Date(v) => count(v),
        }
    }

    /// Text rendering of one cell. Dates render as ISO-8601 `YYYY-MM-DD`.
    pub fn render(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Utf8(v) => v.get(row)?.clone(),
            ColumnData::Int32(v) => v.get(row)?.map(|x| x.to_string()),
            ColumnData::Int64(v) => v.get(row)?.map(|x| x.to_string()),
            ColumnData::Float64(v) => v.get(row)?.map(|x| x.to_string()),
            ColumnData::Boolean(v) => v.get(row)?.map(|x| x.to_string()),
            ColumnData::Date(v) => v.get(row)?.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// A named, column-ordered table. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column. All columns of a table must have the same length.
    pub fn with_column(mut self, name: impl Into<String>, data: ColumnData) -> Self {
        debug_assert!(
            self.columns.is_empty() || self.row_count() == data.len(),
            "column length mismatch"
        );
        self.columns.push(Column {
            name: name.into(),
            data,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.data)
    }

    /// Text column accessor, `None` if absent or not text.
    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name)? {
            ColumnData::Utf8(v) => Some(v),
            _ => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }
}
