//! Schema validation gate between transform and load.
//!
//! A table either matches its expected schema or the first violation found is
//! returned. Nothing is loaded unless every table of the run passes.

use crate::error::SchemaError;
use crate::schema::{schema_for, TableSchema};
use crate::table::{ColumnData, Table};
use std::collections::HashMap;
use tracing::{error, info};

/// Check `table` against `expected`.
///
/// Missing columns are reported together, before any type is looked at.
/// Otherwise columns are checked in schema order: type compatibility first,
/// then nulls in non-nullable columns. Last, every primary key value must
/// occur once; the load would otherwise drop the repeats.
pub fn validate(table: &Table, expected: &TableSchema) -> Result<(), SchemaError> {
    let missing: Vec<String> = expected
        .fields
        .iter()
        .filter(|f| table.column(f.name).is_none())
        .map(|f| f.name.to_string())
        .collect();

    if !missing.is_empty() {
        error!(table = table.name(), ?missing, "missing columns");
        return Err(SchemaError::MissingColumns {
            table: table.name().to_string(),
            columns: missing,
        });
    }

    for field in expected.fields {
        let Some(data) = table.column(field.name) else {
            continue;
        };

        let actual = data.physical_type();
        if !field.logical_type.accepts(actual) {
            error!(
                table = table.name(),
                column = field.name,
                expected = %field.logical_type,
                actual = %actual,
                "column has incorrect type"
            );
            return Err(SchemaError::TypeMismatch {
                table: table.name().to_string(),
                column: field.name.to_string(),
                expected: field.logical_type.to_string(),
                actual: actual.to_string(),
            });
        }

        if !field.nullable {
            let nulls = data.null_count();
            if nulls > 0 {
                error!(table = table.name(), column = field.name, nulls, "null values in required column");
                return Err(SchemaError::UnexpectedNull {
                    table: table.name().to_string(),
                    column: field.name.to_string(),
                    nulls,
                });
            }
        }
    }

    if let Some(data) = table.column(expected.primary_key) {
        check_unique_key(table.name(), expected.primary_key, data)?;
    }

    info!(table = table.name(), rows = table.row_count(), "schema validation passed");
    Ok(())
}

/// First primary key value (in row order) that occurs more than once.
fn check_unique_key(table: &str, column: &str, data: &ColumnData) -> Result<(), SchemaError> {
    let keys: Vec<Option<String>> = (0..data.len()).map(|row| data.render(row)).collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys.iter().flatten() {
        *counts.entry(key.as_str()).or_default() += 1;
    }

    let duplicate = keys
        .iter()
        .flatten()
        .find_map(|key| counts.get(key.as_str()).filter(|&&n| n > 1).map(|&n| (key, n)));

    match duplicate {
        Some((key, rows)) => {
            error!(table, column, key = %key, rows, "duplicate primary key");
            Err(SchemaError::DuplicateKey {
                table: table.to_string(),
                column: column.to_string(),
                key: key.clone(),
                rows,
            })
        }
        None => Ok(()),
    }
}

/// Validate every table of a run against its registered schema.
pub fn validate_all<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Result<(), SchemaError> {
    for table in tables {
        let expected =
            schema_for(table.name()).ok_or_else(|| SchemaError::UnknownTable(table.name().to_string()))?;
        validate(table, expected)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DIM_CLIENTS, DIM_TIME};
    use crate::table::ColumnData;

    fn text(values: &[Option<&str>]) -> ColumnData {
        ColumnData::Utf8(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    fn clients() -> Table {
        Table::new("dim_clients")
            .with_column("client_id", text(&[Some("37036cd8f9746d3"), Some("9b4ed45bf939450")]))
            .with_column("client_name", text(&[Some("Acme"), Some("Globex")]))
    }

    #[test]
    fn test_valid_table_passes() {
        assert_eq!(validate(&clients(), &DIM_CLIENTS), Ok(()));
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let table = clients().with_column("index", ColumnData::Int64(vec![Some(0), Some(1)]));
        assert!(validate(&table, &DIM_CLIENTS).is_ok());
    }

    #[test]
    fn test_missing_column_reported_without_type_errors() {
        // client_id is also the wrong type, but only the missing column is reported
        let table = Table::new("dim_clients").with_column("client_id", ColumnData::Int64(vec![Some(1)]));
        assert_eq!(
            validate(&table, &DIM_CLIENTS),
            Err(SchemaError::MissingColumns {
                table: "dim_clients".into(),
                columns: vec!["client_name".into()],
            })
        );
    }

    #[test]
    fn test_type_mismatch_names_column() {
        let table = Table::new("dim_clients")
            .with_column("client_id", text(&[Some("a")]))
            .with_column("client_name", ColumnData::Float64(vec![Some(1.0)]));
        assert_eq!(
            validate(&table, &DIM_CLIENTS),
            Err(SchemaError::TypeMismatch {
                table: "dim_clients".into(),
                column: "client_name".into(),
                expected: "text".into(),
                actual: "float64".into(),
            })
        );
    }

    #[test]
    fn test_first_mismatch_stops_validation() {
        let table = Table::new("dim_clients")
            .with_column("client_id", ColumnData::Boolean(vec![Some(true)]))
            .with_column("client_name", ColumnData::Boolean(vec![Some(true)]));
        match validate(&table, &DIM_CLIENTS) {
            Err(SchemaError::TypeMismatch { column, .. }) => assert_eq!(column, "client_id"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_null_in_required_column() {
        let table = Table::new("dim_clients")
            .with_column("client_id", text(&[Some("a"), None]))
            .with_column("client_name", text(&[Some("Acme"), Some("Initech")]));
        assert_eq!(
            validate(&table, &DIM_CLIENTS),
            Err(SchemaError::UnexpectedNull {
                table: "dim_clients".into(),
                column: "client_id".into(),
                nulls: 1,
            })
        );
    }

    #[test]
    fn test_integer_widths_are_compatible() {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let time = crate::calendar::build_calendar_dimension(start, start).unwrap();
        assert!(validate(&time, &DIM_TIME).is_ok());
    }

    #[test]
    fn test_repeated_primary_key_fails() {
        let table = Table::new("dim_clients")
            .with_column("client_id", text(&[Some("a"), Some("b"), Some("b")]))
            .with_column("client_name", text(&[Some("Acme"), Some("Globex"), Some("Globex Corp")]));
        assert_eq!(
            validate(&table, &DIM_CLIENTS),
            Err(SchemaError::DuplicateKey {
                table: "dim_clients".into(),
                column: "client_id".into(),
                key: "b".into(),
                rows: 2,
            })
        );
    }

    #[test]
    fn test_null_reported_before_duplicate_key() {
        let table = Table::new("dim_clients")
            .with_column("client_id", text(&[Some("a"), Some("a"), None]))
            .with_column("client_name", text(&[Some("x"), Some("y"), Some("z")]));
        assert!(matches!(
            validate(&table, &DIM_CLIENTS),
            Err(SchemaError::UnexpectedNull { .. })
        ));
    }

    #[test]
    fn test_validate_all_rejects_unknown_table() {
        let stray = Table::new("float");
        assert_eq!(
            validate_all([&clients(), &stray]),
            Err(SchemaError::UnknownTable("float".into()))
        );
    }
}
