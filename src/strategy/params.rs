//! Pipeline Parameters
//!
//! Runtime configuration for every stage of the risk pipeline.
//! Defaults reproduce the production calibration (20/12-period windows,
//! 2% contamination, 2:1 weekly/daily fusion weights).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::RiskPoints;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineParams {
    pub features: FeatureParams,
    pub rules: RuleParams,
    pub outlier: OutlierParams,
    pub fusion: FusionParams,
    pub aggregation: AggregationParams,
    pub predictor: PredictorParams,
    pub projection: ProjectionParams,
    pub recommendation: RecommendationParams,
    /// Company pattern for the peer-group comparison, if any
    pub peer_group: Option<String>,
}

impl PipelineParams {
    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.outlier.contamination = contamination;
        self
    }

    pub fn with_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.predictor.cutoff = cutoff;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.outlier.seed = seed;
        self.predictor.seed = seed;
        self
    }

    pub fn with_windows(mut self, daily: usize, weekly: usize) -> Self {
        self.features.daily_window = daily;
        self.features.weekly_window = weekly;
        self
    }

    pub fn with_peer_group(mut self, pattern: impl Into<String>) -> Self {
        self.peer_group = Some(pattern.into());
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.features.validate()?;
        self.rules.validate()?;
        self.outlier.validate()?;
        self.fusion.validate()?;
        self.aggregation.validate()?;
        self.predictor.validate()?;
        self.projection.validate()?;
        self.recommendation.validate()?;
        Ok(())
    }
}

/// Feature engine windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Rolling volatility window for daily observations
    pub daily_window: usize,
    /// Rolling volatility window for weekly observations
    pub weekly_window: usize,
    /// Short momentum horizon (weekly)
    pub momentum_short: usize,
    /// Long momentum horizon (weekly)
    pub momentum_long: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            daily_window: 20,
            weekly_window: 12,
            momentum_short: 4,
            momentum_long: 12,
        }
    }
}

impl FeatureParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.daily_window < 2 {
            return Err(ParamsError::InvalidWindow("daily_window", self.daily_window));
        }
        if self.weekly_window < 2 {
            return Err(ParamsError::InvalidWindow("weekly_window", self.weekly_window));
        }
        if self.momentum_short == 0 {
            return Err(ParamsError::InvalidWindow("momentum_short", self.momentum_short));
        }
        if self.momentum_long <= self.momentum_short {
            return Err(ParamsError::InvalidWindow("momentum_long", self.momentum_long));
        }
        Ok(())
    }
}

/// Threshold rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleParams {
    /// Absolute z-score above which a return is anomalous
    pub z_threshold: f64,
    /// Cross-sectional quantile (0-1) of volatility above which a row is anomalous
    pub volatility_quantile: f64,
    /// Daily drawdown floor (negative fraction)
    pub daily_drawdown: f64,
    /// Weekly drawdown floor (negative fraction)
    pub weekly_drawdown: f64,
}

impl Default for RuleParams {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            volatility_quantile: 0.99,
            daily_drawdown: -0.10,
            weekly_drawdown: -0.15,
        }
    }
}

impl RuleParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.z_threshold <= 0.0 {
            return Err(ParamsError::InvalidZThreshold(self.z_threshold));
        }
        if !(0.0..=1.0).contains(&self.volatility_quantile) {
            return Err(ParamsError::InvalidQuantile(self.volatility_quantile));
        }
        if self.daily_drawdown >= 0.0 || self.daily_drawdown <= -1.0 {
            return Err(ParamsError::InvalidDrawdown(self.daily_drawdown));
        }
        if self.weekly_drawdown >= 0.0 || self.weekly_drawdown <= -1.0 {
            return Err(ParamsError::InvalidDrawdown(self.weekly_drawdown));
        }
        Ok(())
    }
}

/// Isolation forest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierParams {
    /// Expected share of anomalous rows
    pub contamination: f64,
    pub daily_trees: usize,
    pub weekly_trees: usize,
    /// Subsample drawn per tree (capped at the number of rows)
    pub max_samples: usize,
    pub seed: u64,
    /// Fewer valid rows than this is a model-fit failure
    pub min_rows: usize,
    /// Degraded mode: flag unscored rows when their rule score reaches this value
    pub fallback_rule_threshold: Option<u8>,
}

impl Default for OutlierParams {
    fn default() -> Self {
        Self {
            contamination: 0.02,
            daily_trees: 200,
            weekly_trees: 300,
            max_samples: 256,
            seed: 42,
            min_rows: 32,
            fallback_rule_threshold: None,
        }
    }
}

impl OutlierParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.contamination <= 0.0 || self.contamination > 0.5 {
            return Err(ParamsError::InvalidContamination(self.contamination));
        }
        if self.daily_trees == 0 || self.weekly_trees == 0 {
            return Err(ParamsError::InvalidTreeCount(self.daily_trees.min(self.weekly_trees)));
        }
        if self.max_samples < 2 {
            return Err(ParamsError::InvalidSampleSize(self.max_samples));
        }
        if self.min_rows < 2 {
            return Err(ParamsError::InvalidSampleSize(self.min_rows));
        }
        Ok(())
    }
}

/// Daily/weekly fusion weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionParams {
    pub weekly_weight: u8,
    pub daily_weight: u8,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            weekly_weight: 2,
            daily_weight: 1,
        }
    }
}

impl FusionParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.weekly_weight == 0 && self.daily_weight == 0 {
            return Err(ParamsError::InvalidFusionWeights(self.weekly_weight, self.daily_weight));
        }
        Ok(())
    }

    pub fn combine(&self, weekly_flag: u8, daily_flag: u8) -> u8 {
        self.weekly_weight
            .saturating_mul(weekly_flag)
            .saturating_add(self.daily_weight.saturating_mul(daily_flag))
    }
}

/// Per-fund aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationParams {
    pub points: RiskPoints,
    /// %HIGH at or above which a fund is classed HIGH_RISK
    pub high_pct_threshold: f64,
    /// %MEDIUM_OR_HIGH at or above which a fund is classed MEDIUM_RISK
    pub medium_or_high_pct_threshold: f64,
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self {
            points: RiskPoints::default(),
            high_pct_threshold: 10.0,
            medium_or_high_pct_threshold: 20.0,
        }
    }
}

impl AggregationParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.points.is_monotonic() {
            return Err(ParamsError::InvalidRiskPoints);
        }
        for pct in [self.high_pct_threshold, self.medium_or_high_pct_threshold] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(ParamsError::InvalidPercentage(pct));
            }
        }
        Ok(())
    }
}

/// Next-period classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorParams {
    /// Rows dated on or before the cutoff train the model; later rows are tested
    pub cutoff: NaiveDate,
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Compensate class imbalance with inverse-frequency weights
    pub balanced: bool,
    pub seed: u64,
    pub min_train_rows: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            cutoff: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            trees: 300,
            max_depth: 8,
            min_samples_split: 2,
            balanced: true,
            seed: 42,
            min_train_rows: 20,
        }
    }
}

impl PredictorParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.trees == 0 {
            return Err(ParamsError::InvalidTreeCount(self.trees));
        }
        if self.max_depth == 0 {
            return Err(ParamsError::InvalidDepth(self.max_depth));
        }
        if self.min_samples_split < 2 {
            return Err(ParamsError::InvalidSampleSize(self.min_samples_split));
        }
        if self.min_train_rows == 0 {
            return Err(ParamsError::InvalidSampleSize(self.min_train_rows));
        }
        Ok(())
    }
}

/// 30-day projection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParams {
    /// Only the latest N predictions per instrument; all of them when unset
    pub lookback: Option<usize>,
    pub avg_weight: f64,
    pub share_weight: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub low_threshold: f64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            lookback: None,
            avg_weight: 0.6,
            share_weight: 0.4,
            high_threshold: 2.4,
            medium_threshold: 1.6,
            low_threshold: 0.8,
        }
    }
}

impl ProjectionParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.lookback == Some(0) {
            return Err(ParamsError::InvalidWindow("lookback", 0));
        }
        if !(self.low_threshold < self.medium_threshold
            && self.medium_threshold < self.high_threshold)
        {
            return Err(ParamsError::InvalidThresholdOrder(
                self.low_threshold,
                self.medium_threshold,
                self.high_threshold,
            ));
        }
        Ok(())
    }
}

/// Priority score weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationParams {
    pub projected_weight: f64,
    pub current_weight: f64,
    pub probability_weight: f64,
}

impl Default for RecommendationParams {
    fn default() -> Self {
        Self {
            projected_weight: 0.65,
            current_weight: 0.35,
            probability_weight: 0.75,
        }
    }
}

impl RecommendationParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        for w in [self.projected_weight, self.current_weight, self.probability_weight] {
            if !w.is_finite() || w < 0.0 {
                return Err(ParamsError::InvalidWeight(w));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("Invalid window {0}: {1}")]
    InvalidWindow(&'static str, usize),
    #[error("Invalid z-threshold: {0} (must be > 0)")]
    InvalidZThreshold(f64),
    #[error("Invalid quantile: {0} (must be 0-1)")]
    InvalidQuantile(f64),
    #[error("Invalid drawdown threshold: {0} (must be -1 < d < 0)")]
    InvalidDrawdown(f64),
    #[error("Invalid contamination: {0} (must be 0 < c <= 0.5)")]
    InvalidContamination(f64),
    #[error("Invalid tree count: {0}")]
    InvalidTreeCount(usize),
    #[error("Invalid tree depth: {0}")]
    InvalidDepth(usize),
    #[error("Invalid sample size: {0}")]
    InvalidSampleSize(usize),
    #[error("Invalid fusion weights: weekly={0}, daily={1}")]
    InvalidFusionWeights(u8, u8),
    #[error("Risk points must be finite and non-decreasing from NORMAL to HIGH_RISK")]
    InvalidRiskPoints,
    #[error("Invalid percentage: {0} (must be 0-100)")]
    InvalidPercentage(f64),
    #[error("Projection thresholds must satisfy low < medium < high, got {0} / {1} / {2}")]
    InvalidThresholdOrder(f64, f64, f64),
    #[error("Invalid weight: {0}")]
    InvalidWeight(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = PipelineParams::default();
        assert_eq!(params.features.daily_window, 20);
        assert_eq!(params.features.weekly_window, 12);
        assert_eq!(params.outlier.contamination, 0.02);
        assert_eq!(params.fusion.weekly_weight, 2);
        assert_eq!(params.fusion.daily_weight, 1);
        assert_eq!(
            params.predictor.cutoff,
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_builder() {
        let cutoff = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
        let params = PipelineParams::default()
            .with_contamination(0.05)
            .with_cutoff(cutoff)
            .with_windows(10, 6)
            .with_seed(7);
        assert_eq!(params.outlier.contamination, 0.05);
        assert_eq!(params.predictor.cutoff, cutoff);
        assert_eq!(params.features.daily_window, 10);
        assert_eq!(params.predictor.seed, 7);
    }

    #[test]
    fn test_invalid_contamination() {
        let params = PipelineParams::default().with_contamination(0.0);
        assert!(matches!(params.validate(), Err(ParamsError::InvalidContamination(_))));
    }

    #[test]
    fn test_invalid_momentum_horizons() {
        let mut features = FeatureParams::default();
        features.momentum_long = 4;
        assert!(matches!(features.validate(), Err(ParamsError::InvalidWindow("momentum_long", 4))));
    }

    #[test]
    fn test_invalid_drawdown() {
        let mut rules = RuleParams::default();
        rules.daily_drawdown = 0.1;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_fusion_combine() {
        let fusion = FusionParams::default();
        assert_eq!(fusion.combine(0, 0), 0);
        assert_eq!(fusion.combine(0, 1), 1);
        assert_eq!(fusion.combine(1, 0), 2);
        assert_eq!(fusion.combine(1, 1), 3);

        let zero = FusionParams { weekly_weight: 0, daily_weight: 0 };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_projection_threshold_order() {
        let mut projection = ProjectionParams::default();
        assert!(projection.validate().is_ok());
        projection.medium_threshold = 3.0;
        assert!(matches!(
            projection.validate(),
            Err(ParamsError::InvalidThresholdOrder(..))
        ));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let params: PipelineParams = serde_json::from_str(
            r#"{"outlier": {"contamination": 0.03}, "predictor": {"cutoff": "2023-12-31"}}"#,
        )
        .unwrap();
        assert_eq!(params.outlier.contamination, 0.03);
        assert_eq!(params.outlier.daily_trees, 200);
        assert_eq!(params.predictor.max_depth, 8);
        assert_eq!(
            params.predictor.cutoff,
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
    }
}
