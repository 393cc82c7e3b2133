//! Expected warehouse schemas.
//!
//! One `TableSchema` per output table. The same definitions drive schema
//! validation, table provisioning and loading, so the three can never drift.

use crate::table::PhysicalType;
use std::fmt;

/// Closed set of logical column types a warehouse table can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
}

impl LogicalType {
    /// Compatibility table between declared and built column types.
    ///
    /// Text accepts any string storage, integers accept any bit width, every
    /// other pairing must match exactly.
    pub fn accepts(self, physical: PhysicalType) -> bool {
        matches!(
            (self, physical),
            (LogicalType::Text, PhysicalType::Utf8)
                | (LogicalType::Integer, PhysicalType::Int32 | PhysicalType::Int64)
                | (LogicalType::Float, PhysicalType::Float64)
                | (LogicalType::Boolean, PhysicalType::Boolean)
                | (LogicalType::Date, PhysicalType::Date)
        )
    }

    /// Postgres column type used when provisioning.
    pub fn sql_type(self) -> &'static str {
        match self {
            LogicalType::Text => "TEXT",
            LogicalType::Integer => "BIGINT",
            LogicalType::Float => "DOUBLE PRECISION",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::Date => "DATE",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::Text => "text",
            LogicalType::Integer => "integer",
            LogicalType::Float => "float",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub logical_type: LogicalType,
    pub nullable: bool,
}

const fn required(name: &'static str, logical_type: LogicalType) -> Field {
    Field {
        name,
        logical_type,
        nullable: false,
    }
}

const fn nullable(name: &'static str, logical_type: LogicalType) -> Field {
    Field {
        name,
        logical_type,
        nullable: true,
    }
}

/// Ordered column set of one warehouse table plus its storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [Field],
    pub primary_key: &'static str,
    /// Column the warehouse partitions on, if any.
    pub partition_by: Option<&'static str>,
    /// Columns the warehouse clusters on, in order.
    pub cluster_by: &'static [&'static str],
}

use LogicalType::{Boolean, Date, Float, Integer, Text};

pub const DIM_CLIENTS: TableSchema = TableSchema {
    name: "dim_clients",
    fields: &[required("client_id", Text), required("client_name", Text)],
    primary_key: "client_id",
    partition_by: None,
    cluster_by: &[],
};

pub const DIM_PROJECTS: TableSchema = TableSchema {
    name: "dim_projects",
    fields: &[required("project_id", Text), required("project_name", Text)],
    primary_key: "project_id",
    partition_by: None,
    cluster_by: &["project_id"],
};

pub const DIM_PERSONS: TableSchema = TableSchema {
    name: "dim_persons",
    fields: &[required("person_id", Text), required("person_name", Text)],
    primary_key: "person_id",
    partition_by: None,
    cluster_by: &[],
};

pub const DIM_ROLES: TableSchema = TableSchema {
    name: "dim_roles",
    fields: &[required("role_id", Text), required("role_name", Text)],
    primary_key: "role_id",
    partition_by: None,
    cluster_by: &[],
};

pub const DIM_TASKS: TableSchema = TableSchema {
    name: "dim_tasks",
    fields: &[required("task_id", Text), required("task_name", Text)],
    primary_key: "task_id",
    partition_by: None,
    cluster_by: &["task_id"],
};

pub const DIM_TIME: TableSchema = TableSchema {
    name: "dim_time",
    fields: &[
        required("date", Date),
        required("day_of_week", Text),
        required("day_of_week_number", Integer),
        required("day_of_month", Integer),
        required("day_of_year", Integer),
        required("week_of_year", Integer),
        required("month", Integer),
        required("month_name", Text),
        required("quarter", Integer),
        required("year", Integer),
        required("is_weekend", Boolean),
    ],
    primary_key: "date",
    partition_by: None,
    cluster_by: &[],
};

pub const FACT_WORK_TRACKING: TableSchema = TableSchema {
    name: "fact_work_tracking",
    fields: &[
        required("work_tracking_id", Text),
        required("client_id", Text),
        required("project_id", Text),
        required("role_id", Text),
        required("person_id", Text),
        required("task_id", Text),
        required("date", Date),
        nullable("task_note", Text),
        required("billable", Boolean),
        required("hours_logged", Float),
        nullable("estimated_hours", Float),
        required("start_date", Date),
        required("end_date", Date),
    ],
    primary_key: "work_tracking_id",
    partition_by: Some("date"),
    cluster_by: &["project_id", "client_id", "person_id", "task_id"],
};

/// Every table the pipeline produces, dimensions first.
pub const CATALOG: &[TableSchema] = &[
    DIM_CLIENTS,
    DIM_PROJECTS,
    DIM_PERSONS,
    DIM_ROLES,
    DIM_TASKS,
    DIM_TIME,
    FACT_WORK_TRACKING,
];

pub fn schema_for(table: &str) -> Option<&'static TableSchema> {
    CATALOG.iter().find(|s| s.name == table)
}

/// Double-quote an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl TableSchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn qualified_name(&self, namespace: &str) -> String {
        format!("{}.{}", quote_ident(namespace), quote_ident(self.name))
    }

    /// DDL that creates the table (if absent) plus its layout indexes.
    pub fn create_table_sql(&self, namespace: &str) -> Vec<String> {
        let qualified = self.qualified_name(namespace);

        let mut columns: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let null = if f.nullable { "" } else { " NOT NULL" };
                format!("    {} {}{}", quote_ident(f.name), f.logical_type.sql_type(), null)
            })
            .collect();
        columns.push(format!("    PRIMARY KEY ({})", quote_ident(self.primary_key)));

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            qualified,
            columns.join(",\n")
        )];

        if let Some(partition) = self.partition_by {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("{}_{}_idx", self.name, partition)),
                qualified,
                quote_ident(partition)
            ));
        }

        if !self.cluster_by.is_empty() && self.cluster_by != [self.primary_key] {
            let cols: Vec<String> = self.cluster_by.iter().map(|c| quote_ident(c)).collect();
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("{}_cluster_idx", self.name)),
                qualified,
                cols.join(", ")
            ));
        }

        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_table() {
        assert!(LogicalType::Text.accepts(PhysicalType::Utf8));
        assert!(LogicalType::Integer.accepts(PhysicalType::Int32));
        assert!(LogicalType::Integer.accepts(PhysicalType::Int64));
        assert!(LogicalType::Float.accepts(PhysicalType::Float64));
        assert!(LogicalType::Boolean.accepts(PhysicalType::Boolean));
        assert!(LogicalType::Date.accepts(PhysicalType::Date));

        assert!(!LogicalType::Float.accepts(PhysicalType::Int64));
        assert!(!LogicalType::Integer.accepts(PhysicalType::Float64));
        assert!(!LogicalType::Date.accepts(PhysicalType::Utf8));
        assert!(!LogicalType::Text.accepts(PhysicalType::Date));
        assert!(!LogicalType::Boolean.accepts(PhysicalType::Utf8));
    }

    #[test]
    fn test_catalog_has_every_table() {
        let names: Vec<&str> = CATALOG.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "dim_clients",
                "dim_projects",
                "dim_persons",
                "dim_roles",
                "dim_tasks",
                "dim_time",
                "fact_work_tracking"
            ]
        );
        assert!(schema_for("fact_work_tracking").is_some());
        assert!(schema_for("float").is_none());
    }

    #[test]
    fn test_primary_keys_are_required_fields() {
        for schema in CATALOG {
            let pk = schema.field(schema.primary_key).unwrap();
            assert!(!pk.nullable, "{} primary key is nullable", schema.name);
        }
    }

    #[test]
    fn test_fact_nullable_columns() {
        let nullable: Vec<&str> = FACT_WORK_TRACKING
            .fields
            .iter()
            .filter(|f| f.nullable)
            .map(|f| f.name)
            .collect();
        assert_eq!(nullable, vec!["task_note", "estimated_hours"]);
    }

    #[test]
    fn test_create_table_sql_for_dimension() {
        let sql = DIM_CLIENTS.create_table_sql("sora_dataset");
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS \"sora_dataset\".\"dim_clients\""));
        assert!(sql[0].contains("\"client_id\" TEXT NOT NULL"));
        assert!(sql[0].contains("PRIMARY KEY (\"client_id\")"));
    }

    #[test]
    fn test_create_table_sql_for_fact_layout() {
        let sql = FACT_WORK_TRACKING.create_table_sql("ns");
        assert_eq!(sql.len(), 3);
        assert!(sql[0].contains("\"estimated_hours\" DOUBLE PRECISION,"));
        assert!(sql[0].contains("\"hours_logged\" DOUBLE PRECISION NOT NULL"));
        assert!(sql[1].contains("(\"date\")"));
        assert!(sql[2].contains("(\"project_id\", \"client_id\", \"person_id\", \"task_id\")"));
    }

    #[test]
    fn test_cluster_on_primary_key_needs_no_index() {
        assert_eq!(DIM_PROJECTS.create_table_sql("ns").len(), 1);
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
