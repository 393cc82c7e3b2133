//! Run configuration: JSON run-config file, CLI overrides and environment.

use crate::calendar::{CALENDAR_END, CALENDAR_START};
use crate::error::{EtlError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_NAMESPACE: &str = "sora_dataset";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Shape of `config.json`. The extract keys keep the names the upstream
/// exports were published under.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    #[serde(alias = "float_path", default)]
    pub allocation_path: Option<PathBuf>,
    #[serde(alias = "clickup_path", default)]
    pub task_log_path: Option<PathBuf>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub calendar_start: Option<String>,
    #[serde(default)]
    pub calendar_end: Option<String>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EtlError::InputIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| EtlError::Config(format!("{}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

/// Values given on the command line. Each one overrides the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub allocation_path: Option<PathBuf>,
    pub task_log_path: Option<PathBuf>,
}

/// Everything the transform stage needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub allocation_path: PathBuf,
    pub task_log_path: PathBuf,
    pub calendar_start: NaiveDate,
    pub calendar_end: NaiveDate,
}

fn parse_calendar_date(key: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| EtlError::Config(format!("{key} '{value}' is not a YYYY-MM-DD date: {e}")))
}

impl PipelineConfig {
    pub fn resolve(file: &FileConfig, overrides: &Overrides) -> Result<Self> {
        let allocation_path = overrides
            .allocation_path
            .clone()
            .or_else(|| file.allocation_path.clone())
            .ok_or_else(|| EtlError::Config("no allocation extract path (float_path)".into()))?;
        let task_log_path = overrides
            .task_log_path
            .clone()
            .or_else(|| file.task_log_path.clone())
            .ok_or_else(|| EtlError::Config("no task-log extract path (clickup_path)".into()))?;

        let calendar_start = parse_calendar_date(
            "calendar_start",
            file.calendar_start.as_deref().unwrap_or(CALENDAR_START),
        )?;
        let calendar_end =
            parse_calendar_date("calendar_end", file.calendar_end.as_deref().unwrap_or(CALENDAR_END))?;

        if calendar_end < calendar_start {
            return Err(EtlError::Config(format!(
                "calendar_end {calendar_end} is before calendar_start {calendar_start}"
            )));
        }

        Ok(Self {
            allocation_path,
            task_log_path,
            calendar_start,
            calendar_end,
        })
    }
}

/// Warehouse connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseConfig {
    pub db_url: Option<String>,
    pub namespace: String,
    pub max_connections: u32,
}

impl WarehouseConfig {
    /// Read `DB_URL`, `WAREHOUSE_SCHEMA` and `DB_MAX_CONNECTIONS`. The
    /// environment wins over the file's `dataset`.
    pub fn from_env(dataset: Option<&str>) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), dataset)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, dataset: Option<&str>) -> Result<Self> {
        let namespace = lookup("WAREHOUSE_SCHEMA")
            .or_else(|| dataset.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| EtlError::Config(format!("DB_MAX_CONNECTIONS '{raw}' is not a positive integer")))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            db_url: lookup("DB_URL").filter(|u| !u.is_empty()),
            namespace,
            max_connections,
        })
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url
            .as_deref()
            .ok_or_else(|| EtlError::Config("DB_URL env var missing".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // -------------------------------------------------------------------------
    // FILE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_legacy_keys() {
        let file = FileConfig::parse(r#"{"float_path": "data/float.csv", "clickup_path": "data/clickup.csv"}"#)
            .unwrap();
        assert_eq!(file.allocation_path, Some(PathBuf::from("data/float.csv")));
        assert_eq!(file.task_log_path, Some(PathBuf::from("data/clickup.csv")));
        assert_eq!(file.dataset, None);
    }

    #[test]
    fn test_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"allocation_path": "a.csv", "task_log_path": "t.csv", "dataset": "dw"}}"#).unwrap();
        let file = FileConfig::from_file(f.path()).unwrap();
        assert_eq!(file.dataset.as_deref(), Some("dw"));
    }

    #[test]
    fn test_from_file_invalid_json() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{ not json").unwrap();
        let err = FileConfig::from_file(f.path()).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = FileConfig::from_file(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, EtlError::InputIo { .. }));
    }

    // -------------------------------------------------------------------------
    // RESOLVE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_resolve_defaults_calendar() {
        let file = FileConfig {
            allocation_path: Some("a.csv".into()),
            task_log_path: Some("t.csv".into()),
            ..Default::default()
        };
        let config = PipelineConfig::resolve(&file, &Overrides::default()).unwrap();
        assert_eq!(config.calendar_start, date(2020, 1, 1));
        assert_eq!(config.calendar_end, date(2030, 12, 31));
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig {
            allocation_path: Some("a.csv".into()),
            task_log_path: Some("t.csv".into()),
            ..Default::default()
        };
        let overrides = Overrides {
            allocation_path: Some("other.csv".into()),
            task_log_path: None,
        };
        let config = PipelineConfig::resolve(&file, &overrides).unwrap();
        assert_eq!(config.allocation_path, PathBuf::from("other.csv"));
        assert_eq!(config.task_log_path, PathBuf::from("t.csv"));
    }

    #[test]
    fn test_resolve_requires_paths() {
        let err = PipelineConfig::resolve(&FileConfig::default(), &Overrides::default()).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_resolve_rejects_bad_calendar() {
        let mut file = FileConfig {
            allocation_path: Some("a.csv".into()),
            task_log_path: Some("t.csv".into()),
            calendar_start: Some("01/01/2020".into()),
            ..Default::default()
        };
        assert!(PipelineConfig::resolve(&file, &Overrides::default()).is_err());

        file.calendar_start = Some("2025-01-01".into());
        file.calendar_end = Some("2024-01-01".into());
        assert!(PipelineConfig::resolve(&file, &Overrides::default()).is_err());
    }

    // -------------------------------------------------------------------------
    // ENVIRONMENT TESTS
    // -------------------------------------------------------------------------

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_warehouse_defaults() {
        let config = WarehouseConfig::from_lookup(lookup(&[]), None).unwrap();
        assert_eq!(config.namespace, "sora_dataset");
        assert_eq!(config.max_connections, 5);
        assert!(config.require_db_url().is_err());
    }

    #[test]
    fn test_env_wins_over_file_dataset() {
        let config = WarehouseConfig::from_lookup(lookup(&[]), Some("from_file")).unwrap();
        assert_eq!(config.namespace, "from_file");

        let env = lookup(&[("WAREHOUSE_SCHEMA", "from_env"), ("DB_URL", "postgres://localhost/dw")]);
        let config = WarehouseConfig::from_lookup(env, Some("from_file")).unwrap();
        assert_eq!(config.namespace, "from_env");
        assert_eq!(config.require_db_url().unwrap(), "postgres://localhost/dw");
    }

    #[test]
    fn test_invalid_max_connections() {
        for raw in ["zero", "0", "-1"] {
            let err = WarehouseConfig::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", raw)]), None).unwrap_err();
            assert!(matches!(err, EtlError::Config(_)), "{raw}");
        }
    }
}
