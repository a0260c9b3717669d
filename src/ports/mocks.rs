//! In-memory table store for tests
//!
//! Keeps tables as JSON values and records every read and write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::tables::{DatasetError, RawRecord, TableSink, TableSource};

/// In-memory table store that records reads and writes
#[derive(Debug, Default, Clone)]
pub struct InMemoryTables {
    tables: Arc<Mutex<BTreeMap<String, Value>>>,
    reads: Arc<Mutex<Vec<String>>>,
    writes: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to seed a table with raw rows
    pub fn with_table(self, name: &str, rows: Vec<RawRecord>) -> Self {
        let value = Value::Array(rows.into_iter().map(Value::Object).collect());
        lock(&self.tables).insert(name.to_string(), value);
        self
    }

    /// Table content as last written
    pub fn get(&self, name: &str) -> Option<Value> {
        lock(&self.tables).get(name).cloned()
    }

    /// Table names read so far, in call order
    pub fn get_reads(&self) -> Vec<String> {
        lock(&self.reads).clone()
    }

    /// Table names written so far, in call order
    pub fn get_writes(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }
}

impl TableSource for InMemoryTables {
    fn read_table(&self, name: &str) -> Result<Option<Vec<RawRecord>>, DatasetError> {
        lock(&self.reads).push(name.to_string());
        match lock(&self.tables).get(name) {
            None => Ok(None),
            Some(Value::Array(rows)) => rows
                .iter()
                .map(|row| match row {
                    Value::Object(map) => Ok(map.clone()),
                    other => Err(DatasetError::InvalidTable {
                        table: name.to_string(),
                        reason: format!("expected an object per row, got {}", other),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            // report tables are a single object
            Some(Value::Object(map)) => Ok(Some(vec![map.clone()])),
            Some(_) => Err(DatasetError::InvalidTable {
                table: name.to_string(),
                reason: "not an array of rows".to_string(),
            }),
        }
    }

    fn list_tables(&self) -> Result<Vec<String>, DatasetError> {
        Ok(lock(&self.tables).keys().cloned().collect())
    }
}

impl TableSink for InMemoryTables {
    fn write_table(&self, name: &str, table: &Value) -> Result<(), DatasetError> {
        lock(&self.writes).push(name.to_string());
        lock(&self.tables).insert(name.to_string(), table.clone());
        Ok(())
    }
}
