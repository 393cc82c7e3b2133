//! Dimension builder - one deduplicated lookup table per categorical column.
//!
//! The allocation and task-log extracts both carry a column labelled `Task`
//! with different meanings (assigned task vs. logged task). Only the
//! task-log column feeds `dim_tasks`; the two domains are never merged.

use crate::calendar::build_calendar_dimension;
use crate::error::{EtlError, Result};
use crate::identity::generate_id;
use crate::loader::RawTable;
use crate::table::{ColumnData, Table};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::thread::ScopedJoinHandle;
use tracing::{debug, info};

/// Which extract a dimension is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    Allocation,
    TaskLog,
}

/// Source and target names of one categorical dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionSpec {
    pub table: &'static str,
    pub extract: Extract,
    pub source_column: &'static str,
    pub id_column: &'static str,
}

pub const CLIENTS: DimensionSpec = DimensionSpec {
    table: "dim_clients",
    extract: Extract::Allocation,
    source_column: "Client",
    id_column: "client_id",
};

pub const PROJECTS: DimensionSpec = DimensionSpec {
    table: "dim_projects",
    extract: Extract::Allocation,
    source_column: "Project",
    id_column: "project_id",
};

pub const ROLES: DimensionSpec = DimensionSpec {
    table: "dim_roles",
    extract: Extract::Allocation,
    source_column: "Role",
    id_column: "role_id",
};

pub const PERSONS: DimensionSpec = DimensionSpec {
    table: "dim_persons",
    extract: Extract::Allocation,
    source_column: "Name",
    id_column: "person_id",
};

pub const TASKS: DimensionSpec = DimensionSpec {
    table: "dim_tasks",
    extract: Extract::TaskLog,
    source_column: "Task",
    id_column: "task_id",
};

/// Canonical attribute name for a source column: `Client` -> `client_name`.
/// The person column is labelled `Name` in the extract and maps to
/// `person_name`.
pub fn attribute_name(source_column: &str) -> String {
    if source_column == "Name" {
        return "person_name".to_string();
    }
    format!("{}_name", source_column.to_lowercase().replace(' ', "_"))
}

/// A built dimension: natural keys in first-occurrence order plus their ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    table: String,
    name_column: String,
    id_column: String,
    names: Vec<String>,
    ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl Dimension {
    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn name_column(&self) -> &str {
        &self.name_column
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Surrogate id for a natural key, `None` if the key is not in the
    /// dimension.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&i| self.ids[i].as_str())
    }

    /// Warehouse rendering: id column first, then the natural key.
    pub fn to_table(&self) -> Table {
        Table::new(self.table.clone())
            .with_column(
                self.id_column.clone(),
                ColumnData::Utf8(self.ids.iter().cloned().map(Some).collect()),
            )
            .with_column(
                self.name_column.clone(),
                ColumnData::Utf8(self.names.iter().cloned().map(Some).collect()),
            )
    }
}

/// Build a dimension from one column of a raw extract.
///
/// Duplicates are dropped (first occurrence wins) before ids are assigned.
/// Empty cells carry no natural key and are left out; facts referencing them
/// end up with a null foreign key.
pub fn build_dimension(
    raw: &RawTable,
    table: &str,
    column: &str,
    id_column: &str,
) -> Result<Dimension> {
    let values = raw.column(column).ok_or_else(|| {
        EtlError::transform(format!(
            "cannot build {table}: extract '{}' has no column '{column}'",
            raw.name()
        ))
    })?;

    let mut names = Vec::new();
    let mut index = HashMap::new();
    let mut blanks = 0usize;

    for value in values {
        if value.is_empty() {
            blanks += 1;
            continue;
        }
        if !index.contains_key(value) {
            index.insert(value.to_string(), names.len());
            names.push(value.to_string());
        }
    }

    let ids = names.iter().map(|n| generate_id(n)).collect();

    if blanks > 0 {
        debug!(table, column, blanks, "skipped blank natural keys");
    }
    info!(table, rows = names.len(), "{} dimension built", column);

    Ok(Dimension {
        table: table.to_string(),
        name_column: attribute_name(column),
        id_column: id_column.to_string(),
        names,
        ids,
        index,
    })
}

fn build_from_spec(spec: &DimensionSpec, allocation: &RawTable, task_log: &RawTable) -> Result<Dimension> {
    let raw = match spec.extract {
        Extract::Allocation => allocation,
        Extract::TaskLog => task_log,
    };
    build_dimension(raw, spec.table, spec.source_column, spec.id_column)
}

/// All dimensions of one run. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimensions {
    pub clients: Dimension,
    pub projects: Dimension,
    pub roles: Dimension,
    pub persons: Dimension,
    pub tasks: Dimension,
    pub calendar: Table,
}

impl Dimensions {
    /// Warehouse tables in load order.
    pub fn to_tables(&self) -> Vec<Table> {
        vec![
            self.clients.to_table(),
            self.projects.to_table(),
            self.persons.to_table(),
            self.roles.to_table(),
            self.tasks.to_table(),
            self.calendar.clone(),
        ]
    }
}

/// Build the five categorical dimensions and the calendar concurrently.
///
/// The builds read disjoint columns and write disjoint outputs, so each runs
/// on its own scoped thread.
pub fn build_dimensions(
    allocation: &RawTable,
    task_log: &RawTable,
    calendar_start: NaiveDate,
    calendar_end: NaiveDate,
) -> Result<Dimensions> {
    std::thread::scope(|scope| {
        let spawn = |spec: &'static DimensionSpec| {
            scope.spawn(move || build_from_spec(spec, allocation, task_log))
        };
        let clients = spawn(&CLIENTS);
        let projects = spawn(&PROJECTS);
        let roles = spawn(&ROLES);
        let persons = spawn(&PERSONS);
        let tasks = spawn(&TASKS);
        let calendar = scope.spawn(move || build_calendar_dimension(calendar_start, calendar_end));

        Ok(Dimensions {
            clients: join_build(CLIENTS.table, clients)?,
            projects: join_build(PROJECTS.table, projects)?,
            roles: join_build(ROLES.table, roles)?,
            persons: join_build(PERSONS.table, persons)?,
            tasks: join_build(TASKS.table, tasks)?,
            calendar: join_build(crate::calendar::TIME_TABLE, calendar)?,
        })
    })
}

fn join_build<T>(table: &str, handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| EtlError::transform(format!("{table} build panicked")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn allocation() -> RawTable {
        RawTable::parse(
            "allocation",
            "Client,Project,Role,Name,Task,Start Date,End Date,Estimated Hours\n\
             Acme,Website,Designer,Ana,Mockups,2024-01-01,2024-01-31,40\n\
             Globex,Mobile,Engineer,Ben,API,2024-02-01,2024-02-29,80\n\
             Acme,Website,Engineer,Ben,Backend,2024-01-01,2024-01-31,20\n",
        )
        .unwrap()
    }

    fn task_log() -> RawTable {
        RawTable::parse(
            "task_log",
            "Client,Project,Name,Task,Date,Hours,Note,Billable\n\
             Acme,Website,Ana,Wireframes,2024-01-03,4,,Yes\n\
             Acme,Website,Ben,Code review,2024-01-04,2,,No\n",
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // -------------------------------------------------------------------------
    // NAMING TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_attribute_name() {
        assert_eq!(attribute_name("Client"), "client_name");
        assert_eq!(attribute_name("Project"), "project_name");
        assert_eq!(attribute_name("Task"), "task_name");
        assert_eq!(attribute_name("Name"), "person_name");
    }

    // -------------------------------------------------------------------------
    // BUILD TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_dedup_first_occurrence_order() {
        let dim = build_dimension(&allocation(), "dim_clients", "Client", "client_id").unwrap();
        assert_eq!(dim.names(), &["Acme".to_string(), "Globex".to_string()]);
        assert_eq!(dim.ids()[0], generate_id("Acme"));
        assert_eq!(dim.lookup("Globex"), Some(generate_id("Globex").as_str()));
        assert_eq!(dim.lookup("Initech"), None);
    }

    #[test]
    fn test_natural_keys_unique() {
        let dim = build_dimension(&allocation(), "dim_persons", "Name", "person_id").unwrap();
        let unique: HashSet<&String> = dim.names().iter().collect();
        assert_eq!(unique.len(), dim.len());
        assert_eq!(dim.name_column(), "person_name");
    }

    #[test]
    fn test_blank_keys_skipped() {
        let raw = RawTable::parse("allocation", "Client\nAcme\n\"\"\nAcme\n").unwrap();
        let dim = build_dimension(&raw, "dim_clients", "Client", "client_id").unwrap();
        assert_eq!(dim.len(), 1);
    }

    #[test]
    fn test_missing_column_fails() {
        let err = build_dimension(&task_log(), "dim_roles", "Role", "role_id").unwrap_err();
        assert!(matches!(err, EtlError::Transform(_)));
    }

    #[test]
    fn test_to_table_column_order() {
        let dim = build_dimension(&allocation(), "dim_projects", "Project", "project_id").unwrap();
        let table = dim.to_table();
        assert_eq!(table.name(), "dim_projects");
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["project_id", "project_name"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_tasks_come_from_task_log_only() {
        let dims = build_dimensions(&allocation(), &task_log(), date(2024, 1, 1), date(2024, 1, 7)).unwrap();
        assert_eq!(
            dims.tasks.names(),
            &["Wireframes".to_string(), "Code review".to_string()]
        );
        assert_eq!(dims.tasks.lookup("Mockups"), None);
        assert_eq!(dims.calendar.row_count(), 7);
    }

    #[test]
    fn test_build_dimensions_is_deterministic() {
        let a = build_dimensions(&allocation(), &task_log(), date(2024, 1, 1), date(2024, 1, 2)).unwrap();
        let b = build_dimensions(&allocation(), &task_log(), date(2024, 1, 1), date(2024, 1, 2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_tables().len(), 6);
    }

    #[test]
    fn test_build_dimensions_propagates_calendar_error() {
        let err = build_dimensions(&allocation(), &task_log(), date(2024, 1, 2), date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, EtlError::Transform(_)));
    }
}
