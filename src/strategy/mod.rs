//! Strategy Layer - Risk signal computation and statistical modeling
//!
//! Every stage of the risk pipeline lives here as a pure transform:
//! - Feature engineering over per-instrument time series
//! - Two-phase threshold rules and an isolation-forest outlier model
//! - As-of fusion of daily and weekly flags into an ordinal risk level
//! - Per-fund aggregation, next-period classification and 30-day projection
//! - Recommendation table and peer-group comparison
//!
//! Stages never perform I/O; they consume and produce domain records.

pub mod params;
pub mod error;
pub mod stats;
pub mod features;
pub mod rules;
pub mod scaler;
pub mod isolation_forest;
pub mod anomaly;
pub mod fusion;
pub mod aggregator;
pub mod random_forest;
pub mod predictor;
pub mod projection;
pub mod recommendation;
pub mod peer;
pub mod quality;

pub use params::{
    AggregationParams, FeatureParams, FusionParams, OutlierParams, ParamsError, PipelineParams,
    PredictorParams, ProjectionParams, RecommendationParams, RuleParams,
};
pub use error::ModelError;
pub use features::{FeatureEngine, FeatureSet};
pub use rules::RuleThresholds;
pub use scaler::StandardScaler;
pub use isolation_forest::{IsolationForest, IsolationForestConfig};
pub use anomaly::{score_feed, OutlierModel};
pub use fusion::{SignalFusion, WeeklyIndex};
pub use aggregator::RiskAggregator;
pub use random_forest::{ForestConfig, RandomForest};
pub use predictor::{Evaluation, PredictorOutput, RiskPredictor, PREDICTOR_FEATURES};
pub use projection::ForwardProjector;
pub use recommendation::{decide, summarize_actions, ActionSummary, RecommendationEngine};
pub use peer::{peer_report, PeerReport};
pub use quality::QualityReport;
