//! Dataset loader - reads the two raw extracts into untyped tables.
//!
//! No business transformation happens here: cells stay text, column names and
//! row order are preserved. Files that cannot be read, decoded or parsed as
//! delimited text abort the run, as do extracts missing an expected column.

use crate::error::{EtlError, Result};
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use std::path::Path;
use tracing::{info, warn};

/// Columns the allocation extract (Float export) must carry.
pub const ALLOCATION_COLUMNS: &[&str] = &[
    "Client",
    "Project",
    "Role",
    "Name",
    "Task",
    "Start Date",
    "End Date",
    "Estimated Hours",
];

/// Columns the task-log extract (ClickUp export) must carry.
pub const TASK_LOG_COLUMNS: &[&str] = &[
    "Client", "Project", "Name", "Task", "Date", "Hours", "Note", "Billable",
];

/// Raw extract: header plus text rows, exactly as read.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Parse comma-delimited text. Every record must have as many fields as
    /// the header.
    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let malformed = |source| EtlError::MalformedInput {
            extract: name.to_string(),
            source,
        };

        let headers: Vec<String> = reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(malformed)?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect());
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Values of one column in row order.
    pub fn column(&self, column: &str) -> Option<impl Iterator<Item = &str> + '_> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// Fail unless every listed column is present.
    pub fn require_columns(&self, columns: &[&str]) -> Result<()> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| self.column_index(c).is_none())
            .map(|c| c.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::MissingInputColumns {
                extract: self.name.clone(),
                columns: missing,
            })
        }
    }
}

/// Decode file bytes. Exports that are not valid UTF-8 are read as
/// Windows-1252, the usual encoding of spreadsheet CSV exports.
fn decode<'a>(bytes: &'a [u8], path: &Path) -> Cow<'a, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            warn!(path = %path.display(), "extract is not valid UTF-8, decoding as windows-1252");
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Read one extract from disk and check its expected columns.
pub fn read_extract(path: &Path, name: &str, required: &[&str]) -> Result<RawTable> {
    let bytes = std::fs::read(path).map_err(|source| EtlError::InputIo {
        path: path.to_path_buf(),
        source,
    })?;

    let table = RawTable::parse(name, &decode(&bytes, path))?;
    table.require_columns(required)?;

    info!(extract = name, path = %path.display(), rows = table.len(), "extract loaded");
    Ok(table)
}

/// Load the allocation and task-log extracts.
pub fn load_datasets(allocation_path: &Path, task_log_path: &Path) -> Result<(RawTable, RawTable)> {
    let allocation = read_extract(allocation_path, "allocation", ALLOCATION_COLUMNS)?;
    let task_log = read_extract(task_log_path, "task_log", TASK_LOG_COLUMNS)?;
    Ok((allocation, task_log))
}
