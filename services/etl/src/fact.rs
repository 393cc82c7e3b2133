//! Fact builder - joins the two extracts and resolves dimension ids.
//!
//! Allocation rows are authoritative: the join is a left join on
//! (client, project, person). Task-log rows without an allocation are
//! dropped; allocation rows without a task log keep null task-log fields.
//! Any parse failure aborts the whole build.

use crate::dimension::Dimensions;
use crate::error::{EtlError, Result};
use crate::identity::generate_id;
use crate::loader::RawTable;
use crate::table::{ColumnData, Table};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

pub const FACT_TABLE: &str = "fact_work_tracking";

/// Date layouts seen in the exports, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d %b %Y", "%b %d, %Y", "%B %d, %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M", "%m/%d/%Y %I:%M %p"];

/// Parse a date cell. Empty cells are null; anything unparsable is an error.
pub fn parse_date(value: &str, column: &str) -> Result<Option<NaiveDate>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(Some(date));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Some(ts.date()));
        }
    }
    Err(EtlError::transform(format!(
        "unparsable date '{value}' in column '{column}'"
    )))
}

/// Parse an hours cell. Empty cells are null; non-numeric values are errors.
pub fn parse_hours(value: &str, column: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(hours) if hours.is_finite() => Ok(Some(hours)),
        _ => Err(EtlError::transform(format!(
            "non-numeric value '{value}' in column '{column}'"
        ))),
    }
}

/// Map the two-valued billable flag. Anything other than `Yes`/`No` is null.
pub fn parse_billable(value: &str) -> Option<bool> {
    match value.trim() {
        "Yes" => Some(true),
        "No" => Some(false),
        _ => None,
    }
}

/// Column positions in the allocation extract.
struct AllocationColumns {
    client: usize,
    project: usize,
    person: usize,
    role: usize,
    start_date: usize,
    end_date: usize,
    estimated_hours: usize,
}

/// Column positions in the task-log extract.
struct TaskLogColumns {
    client: usize,
    project: usize,
    person: usize,
    task: usize,
    date: usize,
    hours: usize,
    note: usize,
    billable: usize,
}

fn index_of(raw: &RawTable, column: &str) -> Result<usize> {
    raw.column_index(column).ok_or_else(|| {
        EtlError::transform(format!(
            "extract '{}' has no column '{column}'",
            raw.name()
        ))
    })
}

impl AllocationColumns {
    fn resolve(raw: &RawTable) -> Result<Self> {
        Ok(Self {
            client: index_of(raw, "Client")?,
            project: index_of(raw, "Project")?,
            person: index_of(raw, "Name")?,
            role: index_of(raw, "Role")?,
            start_date: index_of(raw, "Start Date")?,
            end_date: index_of(raw, "End Date")?,
            estimated_hours: index_of(raw, "Estimated Hours")?,
        })
    }
}

impl TaskLogColumns {
    fn resolve(raw: &RawTable) -> Result<Self> {
        Ok(Self {
            client: index_of(raw, "Client")?,
            project: index_of(raw, "Project")?,
            person: index_of(raw, "Name")?,
            task: index_of(raw, "Task")?,
            date: index_of(raw, "Date")?,
            hours: index_of(raw, "Hours")?,
            note: index_of(raw, "Note")?,
            billable: index_of(raw, "Billable")?,
        })
    }
}

/// Composite business key: hash of the five foreign keys and the log date.
/// Null if any component is null.
fn work_tracking_id(
    client_id: Option<&str>,
    project_id: Option<&str>,
    task_id: Option<&str>,
    role_id: Option<&str>,
    person_id: Option<&str>,
    date: Option<NaiveDate>,
) -> Option<String> {
    let date = date?.format("%Y-%m-%d").to_string();
    let key = [client_id?, project_id?, task_id?, role_id?, person_id?, date.as_str()].concat();
    Some(generate_id(&key))
}

fn owned(id: Option<&str>) -> Option<String> {
    id.map(str::to_string)
}

/// Build `fact_work_tracking` from the two extracts and the run's dimensions.
pub fn build_fact(allocation: &RawTable, task_log: &RawTable, dims: &Dimensions) -> Result<Table> {
    let a = AllocationColumns::resolve(allocation)?;
    let t = TaskLogColumns::resolve(task_log)?;

    // Task-log rows grouped by join key, in file order.
    let mut logs_by_key: HashMap<(&str, &str, &str), Vec<&Vec<String>>> = HashMap::new();
    for row in task_log.rows() {
        logs_by_key
            .entry((
                row[t.client].as_str(),
                row[t.project].as_str(),
                row[t.person].as_str(),
            ))
            .or_default()
            .push(row);
    }

    let mut work_tracking_ids = Vec::new();
    let mut client_ids = Vec::new();
    let mut project_ids = Vec::new();
    let mut role_ids = Vec::new();
    let mut person_ids = Vec::new();
    let mut task_ids = Vec::new();
    let mut dates = Vec::new();
    let mut task_notes = Vec::new();
    let mut billables = Vec::new();
    let mut hours_logged = Vec::new();
    let mut estimated_hours = Vec::new();
    let mut start_dates = Vec::new();
    let mut end_dates = Vec::new();

    let mut matched_keys: HashSet<(&str, &str, &str)> = HashSet::new();
    let mut unmatched_allocations = 0usize;
    let mut unrecognised_billable = 0usize;

    for alloc in allocation.rows() {
        let key = (
            alloc[a.client].as_str(),
            alloc[a.project].as_str(),
            alloc[a.person].as_str(),
        );

        let client_id = dims.clients.lookup(key.0);
        let project_id = dims.projects.lookup(key.1);
        let person_id = dims.persons.lookup(key.2);
        let role_id = dims.roles.lookup(&alloc[a.role]);
        let start_date = parse_date(&alloc[a.start_date], "Start Date")?;
        let end_date = parse_date(&alloc[a.end_date], "End Date")?;
        let estimate = parse_hours(&alloc[a.estimated_hours], "Estimated Hours")?;

        let logs: Vec<Option<&Vec<String>>> = match logs_by_key.get(&key) {
            Some(rows) => {
                matched_keys.insert(key);
                rows.iter().map(|r| Some(*r)).collect()
            }
            None => {
                unmatched_allocations += 1;
                vec![None]
            }
        };

        for log in logs {
            let task_id = log.and_then(|r| dims.tasks.lookup(&r[t.task]));
            let date = match log {
                Some(r) => parse_date(&r[t.date], "Date")?,
                None => None,
            };
            let hours = match log {
                Some(r) => parse_hours(&r[t.hours], "Hours")?,
                None => None,
            };
            let billable = log.and_then(|r| {
                let flag = parse_billable(&r[t.billable]);
                if flag.is_none() && !r[t.billable].is_empty() {
                    unrecognised_billable += 1;
                }
                flag
            });
            let note = log
                .map(|r| r[t.note].clone())
                .filter(|n| !n.is_empty());

            work_tracking_ids.push(work_tracking_id(
                client_id, project_id, task_id, role_id, person_id, date,
            ));
            client_ids.push(owned(client_id));
            project_ids.push(owned(project_id));
            role_ids.push(owned(role_id));
            person_ids.push(owned(person_id));
            task_ids.push(owned(task_id));
            dates.push(date);
            task_notes.push(note);
            billables.push(billable);
            hours_logged.push(hours);
            estimated_hours.push(estimate);
            start_dates.push(start_date);
            end_dates.push(end_date);
        }
    }

    let dropped_logs: usize = logs_by_key
        .iter()
        .filter(|(key, _)| !matched_keys.contains(*key))
        .map(|(_, rows)| rows.len())
        .sum();

    if unrecognised_billable > 0 {
        warn!(
            rows = unrecognised_billable,
            "billable flag is neither 'Yes' nor 'No', mapped to null"
        );
    }

    let table = Table::new(FACT_TABLE)
        .with_column("work_tracking_id", ColumnData::Utf8(work_tracking_ids))
        .with_column("client_id", ColumnData::Utf8(client_ids))
        .with_column("project_id", ColumnData::Utf8(project_ids))
        .with_column("role_id", ColumnData::Utf8(role_ids))
        .with_column("person_id", ColumnData::Utf8(person_ids))
        .with_column("task_id", ColumnData::Utf8(task_ids))
        .with_column("date", ColumnData::Date(dates))
        .with_column("task_note", ColumnData::Utf8(task_notes))
        .with_column("billable", ColumnData::Boolean(billables))
        .with_column("hours_logged", ColumnData::Float64(hours_logged))
        .with_column("estimated_hours", ColumnData::Float64(estimated_hours))
        .with_column("start_date", ColumnData::Date(start_dates))
        .with_column("end_date", ColumnData::Date(end_dates));

    info!(
        rows = table.row_count(),
        unmatched_allocations,
        dropped_task_logs = dropped_logs,
        "fact table built"
    );
    Ok(table)
}
