//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits and the
//! boundary code around them:
//! - Schema: raw rows to typed observations
//! - JSON store: directory of JSON tables
//! - CLI: Command-line interface handlers

pub mod schema;
pub mod json_store;
pub mod cli;

pub use schema::{ResolvedFeed, SchemaError, SchemaResolver};
pub use json_store::JsonTableStore;
pub use cli::CliApp;
