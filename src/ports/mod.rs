//! Ports Layer - Trait definitions for external dependencies
//!
//! The pipeline consumes and produces abstract named tables. Adapters decide
//! how tables are stored (JSON directory, in-memory for tests).

pub mod tables;
pub mod mocks;

pub use tables::{names, read_records, write_records, DatasetError, RawRecord, TableSink, TableSource};
pub use mocks::InMemoryTables;
