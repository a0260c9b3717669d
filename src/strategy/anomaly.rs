//! Anomaly scoring stage
//!
//! Combines the two independent signals for one feed: the rule score from the
//! calibrated thresholds and the isolation-forest decision over standardized
//! model inputs. The scaler is fitted on exactly the rows the forest is
//! trained on and reused for every row scored afterwards.

use rayon::prelude::*;

use crate::domain::{AnomalyScore, FeatureVector, Granularity};
use crate::strategy::error::ModelError;
use crate::strategy::features::FeatureSet;
use crate::strategy::isolation_forest::{IsolationForest, IsolationForestConfig};
use crate::strategy::params::OutlierParams;
use crate::strategy::rules::RuleThresholds;
use crate::strategy::scaler::StandardScaler;

fn model_name(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Daily => "daily outlier model",
        Granularity::Weekly => "weekly outlier model",
    }
}

/// Fitted scaler + forest for one granularity
#[derive(Debug, Clone)]
pub struct OutlierModel {
    pub granularity: Granularity,
    pub scaler: StandardScaler,
    pub forest: IsolationForest,
    /// Valid rows used for fitting
    pub training_rows: usize,
}

impl OutlierModel {
    pub fn fit(set: &FeatureSet, params: &OutlierParams) -> Result<Self, ModelError> {
        let granularity = set.granularity;
        let rows: Vec<Vec<f64>> = set.model_ready().filter_map(|r| r.model_inputs()).collect();
        if rows.len() < params.min_rows {
            return Err(ModelError::InsufficientRows {
                model: model_name(granularity),
                required: params.min_rows,
                actual: rows.len(),
            });
        }

        let scaler = StandardScaler::fit(&rows)?;
        let scaled = scaler.transform(&rows)?;
        let trees = match granularity {
            Granularity::Daily => params.daily_trees,
            Granularity::Weekly => params.weekly_trees,
        };
        let forest = IsolationForest::fit(
            &scaled,
            &IsolationForestConfig {
                trees,
                max_samples: params.max_samples,
                contamination: params.contamination,
                seed: params.seed,
                min_rows: params.min_rows,
            },
        )?;

        tracing::info!(
            "{} outlier model fitted on {} rows ({} trees, contamination {})",
            granularity,
            rows.len(),
            trees,
            params.contamination
        );

        Ok(Self {
            granularity,
            scaler,
            forest,
            training_rows: rows.len(),
        })
    }

    /// Decision score for one row; `None` when a model input is missing
    pub fn decision(&self, row: &FeatureVector) -> Result<Option<f64>, ModelError> {
        match row.model_inputs() {
            Some(inputs) => {
                let scaled = self.scaler.transform_row(&inputs)?;
                Ok(Some(self.forest.decision_function(&scaled)?))
            }
            None => Ok(None),
        }
    }
}

/// Score every row of a feed. Rows the model cannot score get flag 0, or the
/// rule-based flag when a fallback threshold is configured.
pub fn score_feed(
    set: &FeatureSet,
    thresholds: &RuleThresholds,
    model: &OutlierModel,
    fallback_rule_threshold: Option<u8>,
) -> Result<Vec<AnomalyScore>, ModelError> {
    let scores = set
        .rows
        .par_iter()
        .map(|row| {
            let rule_score = thresholds.score(row);
            let outlier_score = model.decision(row)?;
            let outlier_flag = match (outlier_score, fallback_rule_threshold) {
                (Some(s), _) => u8::from(s < 0.0),
                (None, Some(min)) => u8::from(rule_score >= min),
                (None, None) => 0,
            };
            Ok(AnomalyScore {
                code: row.code.clone(),
                date: row.date,
                outlier_score,
                outlier_flag,
                rule_score,
            })
        })
        .collect::<Result<Vec<_>, ModelError>>()?;

    let flagged = scores.iter().filter(|s| s.outlier_flag == 1).count();
    tracing::info!(
        "{} anomalies: {} of {} rows flagged",
        set.granularity,
        flagged,
        scores.len()
    );
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::strategy::features::FeatureEngine;
    use crate::strategy::params::{FeatureParams, RuleParams};
    use chrono::{Duration, NaiveDate};

    fn feed(days: usize) -> FeatureSet {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut obs = Vec::new();
        for (k, code) in ["MA001", "MA002"].iter().enumerate() {
            let mut nav = 100.0;
            for i in 0..days {
                nav *= 1.0 + 0.004 * (((i * 7 + k * 3) % 11) as f64 - 5.0) / 5.0;
                obs.push(
                    Observation::new(*code, start + Duration::days(i as i64))
                        .with_value(nav)
                        .with_week_return(((i + k) % 9) as f64 - 4.0),
                );
            }
        }
        FeatureEngine::new(FeatureParams::default()).compute(&obs, Granularity::Daily)
    }

    fn params() -> OutlierParams {
        OutlierParams {
            daily_trees: 40,
            ..Default::default()
        }
    }

    #[test]
    fn test_scaler_fitted_on_valid_rows_only() {
        let set = feed(120);
        let model = OutlierModel::fit(&set, &params()).unwrap();
        assert_eq!(model.training_rows, set.model_ready().count());
        assert_eq!(model.scaler.fitted_rows, model.training_rows);
        assert_eq!(model.scaler.width(), 5);
    }

    #[test]
    fn test_excluded_rows_unscored_without_fallback() {
        let set = feed(120);
        let thresholds = RuleThresholds::calibrate(&set.rows, Granularity::Daily, &RuleParams::default());
        let model = OutlierModel::fit(&set, &params()).unwrap();
        let scores = score_feed(&set, &thresholds, &model, None).unwrap();

        assert_eq!(scores.len(), set.rows.len());
        for (s, r) in scores.iter().zip(&set.rows) {
            assert_eq!(s.is_scored(), r.is_model_ready());
            if !s.is_scored() {
                assert_eq!(s.outlier_flag, 0);
            }
        }
        assert!(scores.iter().any(|s| s.outlier_flag == 1));
    }

    #[test]
    fn test_fallback_uses_rule_score() {
        let set = feed(120);
        let thresholds = RuleThresholds {
            granularity: Granularity::Daily,
            z_threshold: 3.0,
            volatility_cutoff: None,
            drawdown_floor: -0.0001,
        };
        let model = OutlierModel::fit(&set, &params()).unwrap();
        let scores = score_feed(&set, &thresholds, &model, Some(1)).unwrap();
        for s in scores.iter().filter(|s| !s.is_scored()) {
            assert_eq!(s.outlier_flag, u8::from(s.rule_score >= 1));
        }
    }

    #[test]
    fn test_too_few_valid_rows_is_fit_failure() {
        let set = feed(22);
        let err = OutlierModel::fit(&set, &params()).unwrap_err();
        let (required, actual) = err.row_counts().unwrap();
        assert_eq!(required, 32);
        assert!(actual < 32);
    }
}
