//! JSON directory table store
//!
//! One table per file: `<dir>/<name>.json`, holding an array of row objects
//! (or a single object for report tables). Writes go to a temporary sibling
//! first and are renamed into place, so readers never see a half-written
//! table.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::ports::{DatasetError, RawRecord, TableSink, TableSource};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct JsonTableStore {
    dir: PathBuf,
}

impl JsonTableStore {
    /// Store rooted at `dir`; a leading `~` is expanded
    pub fn new(dir: impl AsRef<str>) -> Self {
        let expanded = shellexpand::tilde(dir.as_ref()).to_string();
        Self {
            dir: PathBuf::from(expanded),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    fn io_error(name: &str) -> impl FnOnce(std::io::Error) -> DatasetError + '_ {
        move |source| DatasetError::Io {
            table: name.to_string(),
            source,
        }
    }
}

impl TableSource for JsonTableStore {
    fn read_table(&self, name: &str) -> Result<Option<Vec<RawRecord>>, DatasetError> {
        let path = self.table_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(Self::io_error(name))?;
        if content.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let value: Value = serde_json::from_str(&content).map_err(|source| DatasetError::Serialization {
            table: name.to_string(),
            source,
        })?;

        let rows = match value {
            Value::Array(rows) => rows,
            // report tables are a single object
            Value::Object(map) => vec![Value::Object(map)],
            _ => {
                return Err(DatasetError::InvalidTable {
                    table: name.to_string(),
                    reason: format!("{} is not an array of rows", path.display()),
                })
            }
        };

        let total = rows.len();
        let records: Vec<RawRecord> = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        if records.len() < total {
            tracing::warn!(
                "table '{}': ignored {} non-object rows",
                name,
                total - records.len()
            );
        }

        tracing::debug!("Read {} rows from {}", records.len(), path.display());
        Ok(Some(records))
    }

    fn list_tables(&self) -> Result<Vec<String>, DatasetError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(Self::io_error("*"))? {
            let path = entry.map_err(Self::io_error("*"))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl TableSink for JsonTableStore {
    fn write_table(&self, name: &str, table: &Value) -> Result<(), DatasetError> {
        fs::create_dir_all(&self.dir).map_err(Self::io_error(name))?;

        let mut content = serde_json::to_string_pretty(table).map_err(|source| DatasetError::Serialization {
            table: name.to_string(),
            source,
        })?;
        content.push('\n');

        let path = self.table_path(name);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(Self::io_error(name))?;
        fs::rename(&tmp, &path).map_err(Self::io_error(name))?;

        tracing::debug!("Wrote table '{}' to {}", name, path.display());
        Ok(())
    }
}
