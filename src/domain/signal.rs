//! Per-observation signals: engineered features and anomaly scores

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::instrument::Granularity;

/// Names of the outlier-model inputs for the daily feed, in column order
pub const DAILY_MODEL_FEATURES: [&str; 5] =
    ["RET_1J", "ZSCORE_1J", "ZSCORE_1W", "VOL_20D", "DRAWDOWN"];

/// Names of the outlier-model inputs for the weekly feed, in column order
pub const WEEKLY_MODEL_FEATURES: [&str; 6] =
    ["RET_1W", "ZSCORE_1W", "VOL_12W", "DRAWDOWN", "MOM_4W", "MOM_12W"];

/// Derived features for one observation.
///
/// Every feature is `None` when undefined (insufficient history, degenerate
/// statistics, non-finite arithmetic). Missing values are never zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub code: String,
    pub date: NaiveDate,
    pub granularity: Granularity,
    /// Net asset value carried through for reporting
    pub value: Option<f64>,
    /// Decimal period return
    pub ret: Option<f64>,
    /// Z-score of the period return over the instrument's history
    pub z_score: Option<f64>,
    /// Z-score of the reported one-week performance (daily feeds)
    pub z_score_week: Option<f64>,
    pub volatility: Option<f64>,
    pub drawdown: Option<f64>,
    /// Short-horizon trailing mean return (weekly feeds)
    pub momentum_short: Option<f64>,
    /// Long-horizon trailing mean return (weekly feeds)
    pub momentum_long: Option<f64>,
}

impl FeatureVector {
    pub fn empty(code: impl Into<String>, date: NaiveDate, granularity: Granularity) -> Self {
        Self {
            code: code.into(),
            date,
            granularity,
            value: None,
            ret: None,
            z_score: None,
            z_score_week: None,
            volatility: None,
            drawdown: None,
            momentum_short: None,
            momentum_long: None,
        }
    }

    /// Outlier-model inputs, or `None` if any required feature is missing
    pub fn model_inputs(&self) -> Option<Vec<f64>> {
        let columns = match self.granularity {
            Granularity::Daily => vec![
                self.ret,
                self.z_score,
                self.z_score_week,
                self.volatility,
                self.drawdown,
            ],
            Granularity::Weekly => vec![
                self.ret,
                self.z_score,
                self.volatility,
                self.drawdown,
                self.momentum_short,
                self.momentum_long,
            ],
        };
        columns.into_iter().collect()
    }

    pub fn is_model_ready(&self) -> bool {
        self.model_inputs().is_some()
    }
}

/// Independent anomaly signals for one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub code: String,
    pub date: NaiveDate,
    /// Outlier decision score, lower is more anomalous; `None` for excluded rows
    pub outlier_score: Option<f64>,
    /// 1 when the outlier model labels the row anomalous
    pub outlier_flag: u8,
    /// Number of triggered threshold rules
    pub rule_score: u8,
}

impl AnomalyScore {
    pub fn is_scored(&self) -> bool {
        self.outlier_score.is_some()
    }
}
