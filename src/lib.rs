//! FundWatch - Batch risk-signal pipeline for mutual funds
//!
//! Detects anomalous fund behavior from daily and weekly performance feeds,
//! fuses both into a daily risk level, predicts the next period and turns a
//! 30-day projection into one recommendation per fund.
//!
//! # Modules
//!
//! - `domain`: Core entities (Instrument, Observation, RiskLevel, Recommendation)
//! - `ports`: Table abstractions (TableSource, TableSink) and in-memory mock
//! - `strategy`: Every pipeline stage as a pure transform
//! - `adapters`: Schema resolution, JSON table store, CLI
//! - `config`: Configuration loading and validation
//! - `application`: Pipeline orchestration

pub mod domain;
pub mod ports;
pub mod strategy;
pub mod adapters;
pub mod config;
pub mod application;
