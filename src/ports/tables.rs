//! Table port
//!
//! Named tables of JSON rows. Sources return `None` for a table that does not
//! exist; typed reads skip rows that fail to decode.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// One raw input row: column name to cell value
pub type RawRecord = serde_json::Map<String, Value>;

/// Dataset error type
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error on table '{table}': {source}")]
    Io {
        table: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error on table '{table}': {source}")]
    Serialization {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Required table '{0}' not found")]
    MissingTable(String),

    #[error("Invalid table '{table}': {reason}")]
    InvalidTable { table: String, reason: String },
}

/// Table names shared by sources and sinks
pub mod names {
    pub const DAILY: &str = "daily";
    pub const WEEKLY: &str = "weekly";

    pub const FEATURES_DAILY: &str = "features_daily";
    pub const FEATURES_WEEKLY: &str = "features_weekly";
    pub const ANOMALIES_DAILY: &str = "anomalies_daily";
    pub const ANOMALIES_WEEKLY: &str = "anomalies_weekly";
    pub const RISK_RECORDS: &str = "risk_records";
    pub const FUND_RISK_SUMMARY: &str = "fund_risk_summary";
    pub const PREDICTIONS: &str = "predictions";
    pub const PREDICTOR_EVALUATION: &str = "predictor_evaluation";
    pub const PROJECTIONS: &str = "projections";
    pub const RECOMMENDATIONS: &str = "recommendations";
    pub const RECOMMENDATION_SUMMARY: &str = "recommendation_summary";
    pub const PEER_REPORT: &str = "peer_report";
    pub const QUALITY_DAILY: &str = "quality_daily";
    pub const QUALITY_WEEKLY: &str = "quality_weekly";
}

/// Read access to named tables
pub trait TableSource: Send + Sync {
    /// Rows of a table; `Ok(None)` when the table does not exist
    fn read_table(&self, name: &str) -> Result<Option<Vec<RawRecord>>, DatasetError>;

    /// Names of the tables currently available
    fn list_tables(&self) -> Result<Vec<String>, DatasetError>;
}

/// Write access to named tables. A write replaces the table wholesale.
pub trait TableSink: Send + Sync {
    fn write_table(&self, name: &str, table: &Value) -> Result<(), DatasetError>;
}

/// Serialize typed rows and write them as one table
pub fn write_records<T: Serialize>(sink: &dyn TableSink, name: &str, rows: &T) -> Result<(), DatasetError> {
    let value = serde_json::to_value(rows).map_err(|source| DatasetError::Serialization {
        table: name.to_string(),
        source,
    })?;
    sink.write_table(name, &value)
}

/// Typed read of an output table.
///
/// Missing tables yield `Ok(None)`; rows that fail to decode are skipped
/// and logged so consumers can work with partial tables.
pub fn read_records<T: DeserializeOwned>(source: &dyn TableSource, name: &str) -> Result<Option<Vec<T>>, DatasetError> {
    let Some(rows) = source.read_table(name)? else {
        return Ok(None);
    };
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(Value::Object(row)).ok())
        .collect();
    if decoded.len() < total {
        tracing::warn!(
            "table '{}': skipped {} of {} rows that could not be decoded",
            name,
            total - decoded.len(),
            total
        );
    }
    Ok(Some(decoded))
}
