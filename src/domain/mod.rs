//! Domain Layer - Core entities of the risk pipeline
//!
//! Pure data types with no I/O. Each entity is produced by exactly one
//! pipeline stage and consumed read-only by the next:
//! - `instrument`: funds, raw observations, deduplication
//! - `signal`: feature vectors and anomaly scores
//! - `risk`: ordinal risk levels, fused records, per-fund summaries
//! - `outlook`: predictions, projections, recommendations

pub mod instrument;
pub mod signal;
pub mod risk;
pub mod outlook;

pub use instrument::{
    company_contains, partition_by_code, sort_and_dedup, Granularity, Instrument, InstrumentDirectory,
    Observation,
};
pub use signal::{AnomalyScore, FeatureVector, DAILY_MODEL_FEATURES, WEEKLY_MODEL_FEATURES};
pub use risk::{FundRiskSummary, RiskLevel, RiskLevelError, RiskPoints, RiskRecord};
pub use outlook::{Action, Prediction, Projection, Recommendation};
