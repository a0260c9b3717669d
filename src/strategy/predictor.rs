//! Risk Predictor
//!
//! Supervised estimate of the next period's risk level. The target for a row
//! is the level of the same instrument's next record; the last record of each
//! instrument has no target and is dropped. Rows are split on a cutoff date
//! (train <= cutoff < test), the scaler and the forest only ever see training
//! rows, and every test row receives one prediction.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{partition_by_code, AnomalyScore, FeatureVector, Prediction, RiskLevel, RiskRecord};
use crate::strategy::error::ModelError;
use crate::strategy::params::PredictorParams;
use crate::strategy::random_forest::{ForestConfig, RandomForest};
use crate::strategy::scaler::StandardScaler;

/// Classifier inputs, in column order
pub const PREDICTOR_FEATURES: [&str; 8] = [
    "RET_1J",
    "ZSCORE_1J",
    "ZSCORE_1W",
    "VOL_20D",
    "DRAWDOWN",
    "ANOMALY_SCORE_RULES",
    "ANOMALY_SCORE_IF",
    "ANOMALY_COMBINED_SCORE",
];

const N_CLASSES: usize = 4;

/// One supervised example
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub code: String,
    pub date: NaiveDate,
    pub inputs: Vec<f64>,
    pub target: RiskLevel,
}

#[derive(Debug, Clone)]
pub struct TemporalSplit {
    pub cutoff: NaiveDate,
    pub train: Vec<LabeledRow>,
    pub test: Vec<LabeledRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub level: RiskLevel,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Test-split diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub train_rows: usize,
    pub test_rows: usize,
    /// Rows dropped for a missing input
    pub excluded_rows: usize,
    /// `confusion[actual][predicted]`, indexed by ordinal
    pub confusion: Vec<Vec<usize>>,
    pub classes: Vec<ClassMetrics>,
    pub accuracy: Option<f64>,
    /// Descending by importance
    pub importances: Vec<FeatureImportance>,
}

impl Evaluation {
    pub fn from_outcomes(pairs: &[(RiskLevel, RiskLevel)]) -> (Vec<Vec<usize>>, Vec<ClassMetrics>, Option<f64>) {
        let mut confusion = vec![vec![0usize; N_CLASSES]; N_CLASSES];
        for (actual, predicted) in pairs {
            confusion[actual.ordinal() as usize][predicted.ordinal() as usize] += 1;
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let classes = RiskLevel::ALL
            .iter()
            .map(|&level| {
                let c = level.ordinal() as usize;
                let tp = confusion[c][c];
                let support: usize = confusion[c].iter().sum();
                let predicted: usize = confusion.iter().map(|row| row[c]).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    level,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let correct: usize = (0..N_CLASSES).map(|c| confusion[c][c]).sum();
        let accuracy = (!pairs.is_empty()).then(|| ratio(correct, pairs.len()));
        (confusion, classes, accuracy)
    }
}

#[derive(Debug, Clone)]
pub struct PredictorOutput {
    pub predictions: Vec<Prediction>,
    pub evaluation: Evaluation,
    pub scaler: StandardScaler,
}

#[derive(Debug, Clone)]
pub struct RiskPredictor {
    params: PredictorParams,
}

impl RiskPredictor {
    pub fn new(params: PredictorParams) -> Self {
        Self { params }
    }

    /// Join features, anomaly scores and fused records into labeled rows.
    ///
    /// Returns the rows and the number dropped for a missing input.
    pub fn build_dataset(
        features: &[FeatureVector],
        anomalies: &[AnomalyScore],
        records: &[RiskRecord],
    ) -> (Vec<LabeledRow>, usize) {
        let features: BTreeMap<(&str, NaiveDate), &FeatureVector> =
            features.iter().map(|f| ((f.code.as_str(), f.date), f)).collect();
        let anomalies: BTreeMap<(&str, NaiveDate), &AnomalyScore> =
            anomalies.iter().map(|a| ((a.code.as_str(), a.date), a)).collect();

        let mut sorted: Vec<&RiskRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.code.cmp(&b.code).then(a.date.cmp(&b.date)));

        let mut rows = Vec::new();
        let mut excluded = 0;
        for part in partition_by_code(&sorted, |r| r.code.as_str()) {
            for pair in part.windows(2) {
                let (current, next) = (pair[0], pair[1]);
                let key = (current.code.as_str(), current.date);
                let inputs = match (features.get(&key), anomalies.get(&key)) {
                    (Some(f), Some(a)) => [
                        f.ret,
                        f.z_score,
                        f.z_score_week,
                        f.volatility,
                        f.drawdown,
                        Some(f64::from(a.rule_score)),
                        a.outlier_score,
                        Some(f64::from(current.combined_score)),
                    ]
                    .into_iter()
                    .collect::<Option<Vec<f64>>>(),
                    _ => None,
                };
                match inputs {
                    Some(inputs) => rows.push(LabeledRow {
                        code: current.code.clone(),
                        date: current.date,
                        inputs,
                        target: next.level,
                    }),
                    None => excluded += 1,
                }
            }
        }
        (rows, excluded)
    }

    pub fn split(&self, rows: Vec<LabeledRow>) -> TemporalSplit {
        let cutoff = self.params.cutoff;
        let (train, test): (Vec<LabeledRow>, Vec<LabeledRow>) =
            rows.into_iter().partition(|r| r.date <= cutoff);
        TemporalSplit { cutoff, train, test }
    }

    pub fn run(
        &self,
        features: &[FeatureVector],
        anomalies: &[AnomalyScore],
        records: &[RiskRecord],
    ) -> Result<PredictorOutput, ModelError> {
        let (rows, excluded_rows) = Self::build_dataset(features, anomalies, records);
        if excluded_rows > 0 {
            tracing::warn!("predictor: {} rows excluded for missing inputs", excluded_rows);
        }
        let split = self.split(rows);
        tracing::info!(
            "predictor: {} train rows (<= {}), {} test rows",
            split.train.len(),
            split.cutoff,
            split.test.len()
        );

        if split.train.len() < self.params.min_train_rows {
            return Err(ModelError::InsufficientRows {
                model: "risk predictor",
                required: self.params.min_train_rows,
                actual: split.train.len(),
            });
        }

        let train_x: Vec<Vec<f64>> = split.train.iter().map(|r| r.inputs.clone()).collect();
        let train_y: Vec<usize> = split.train.iter().map(|r| r.target.ordinal() as usize).collect();
        let scaler = StandardScaler::fit(&train_x)?;
        let forest = RandomForest::fit(
            &scaler.transform(&train_x)?,
            &train_y,
            N_CLASSES,
            &ForestConfig {
                trees: self.params.trees,
                max_depth: self.params.max_depth,
                min_samples_split: self.params.min_samples_split,
                balanced: self.params.balanced,
                seed: self.params.seed,
            },
        )?;

        let test_x: Vec<Vec<f64>> = split.test.iter().map(|r| r.inputs.clone()).collect();
        let predicted = forest.predict_all(&scaler.transform(&test_x)?)?;

        let mut predictions = Vec::with_capacity(split.test.len());
        for (row, class) in split.test.iter().zip(predicted) {
            let predicted_next = RiskLevel::from_ordinal(class as u8).unwrap_or(RiskLevel::Normal);
            predictions.push(Prediction {
                code: row.code.clone(),
                date: row.date,
                actual_next: row.target,
                predicted_next,
            });
        }
        if predictions.is_empty() {
            tracing::warn!("predictor: no rows after {}, nothing to predict", split.cutoff);
        }

        let pairs: Vec<(RiskLevel, RiskLevel)> =
            predictions.iter().map(|p| (p.actual_next, p.predicted_next)).collect();
        let (confusion, classes, accuracy) = Evaluation::from_outcomes(&pairs);

        let mut importances: Vec<FeatureImportance> = PREDICTOR_FEATURES
            .iter()
            .zip(forest.feature_importances())
            .map(|(name, importance)| FeatureImportance {
                feature: name.to_string(),
                importance,
            })
            .collect();
        importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        if let Some(acc) = accuracy {
            tracing::info!("predictor: test accuracy {:.4}", acc);
        }

        Ok(PredictorOutput {
            predictions,
            evaluation: Evaluation {
                train_rows: split.train.len(),
                test_rows: split.test.len(),
                excluded_rows,
                confusion,
                classes,
                accuracy,
                importances,
            },
            scaler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
    }

    /// Synthetic joined history: level cycles with the return sign
    fn fixture(days: i64) -> (Vec<FeatureVector>, Vec<AnomalyScore>, Vec<RiskRecord>) {
        let mut f = Vec::new();
        let mut a = Vec::new();
        let mut r = Vec::new();
        for code in ["MA1", "MA2"] {
            for i in 0..days {
                let date = start() + Duration::days(i);
                let level = RiskLevel::from_ordinal((i % 4) as u8).unwrap();
                let mut fv = FeatureVector::empty(code, date, crate::domain::Granularity::Daily);
                fv.ret = Some(i as f64 * 0.001);
                fv.z_score = Some((i % 4) as f64);
                fv.z_score_week = Some(0.5);
                fv.volatility = Some(0.01 + (i % 3) as f64 * 0.001);
                fv.drawdown = Some(-0.01);
                f.push(fv);
                a.push(AnomalyScore {
                    code: code.to_string(),
                    date,
                    outlier_score: Some(0.1),
                    outlier_flag: 0,
                    rule_score: (i % 2) as u8,
                });
                r.push(RiskRecord {
                    code: code.to_string(),
                    date,
                    daily_flag: 0,
                    weekly_flag: 0,
                    weekly_date: None,
                    combined_score: level.ordinal(),
                    level,
                });
            }
        }
        (f, a, r)
    }

    fn params() -> PredictorParams {
        PredictorParams {
            trees: 15,
            min_train_rows: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_target_is_next_level_and_last_row_dropped() {
        let (f, a, r) = fixture(6);
        let (rows, excluded) = RiskPredictor::build_dataset(&f, &a, &r);
        assert_eq!(excluded, 0);
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].target, RiskLevel::Low);
        assert_eq!(rows[3].target, RiskLevel::Normal);
        assert_eq!(rows[0].inputs.len(), PREDICTOR_FEATURES.len());
    }

    #[test]
    fn test_missing_input_excludes_row() {
        let (mut f, a, r) = fixture(4);
        f[1].volatility = None;
        let (rows, excluded) = RiskPredictor::build_dataset(&f, &a, &r);
        assert_eq!(excluded, 1);
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_split_is_exact_and_scaler_sees_train_only() {
        let (f, a, r) = fixture(60);
        let predictor = RiskPredictor::new(params());
        let out = predictor.run(&f, &a, &r).unwrap();
        let cutoff = params().cutoff;

        // Dec 1 .. Dec 31 inclusive is training: 31 days x 2 instruments
        assert_eq!(out.evaluation.train_rows, 62);
        assert_eq!(out.scaler.fitted_rows, 62);
        assert!(out.predictions.iter().all(|p| p.date > cutoff));
        assert_eq!(out.predictions.len(), out.evaluation.test_rows);

        let (rows, _) = RiskPredictor::build_dataset(&f, &a, &r);
        let train: Vec<&LabeledRow> = rows.iter().filter(|r| r.date <= cutoff).collect();
        let mean_ret = train.iter().map(|r| r.inputs[0]).sum::<f64>() / train.len() as f64;
        assert_relative_eq!(out.scaler.means[0], mean_ret, epsilon = 1e-12);
    }

    #[test]
    fn test_evaluation_shapes() {
        let (f, a, r) = fixture(60);
        let out = RiskPredictor::new(params()).run(&f, &a, &r).unwrap();
        let eval = &out.evaluation;
        assert_eq!(eval.confusion.len(), 4);
        let total: usize = eval.confusion.iter().flatten().sum();
        assert_eq!(total, eval.test_rows);
        assert_eq!(eval.importances.len(), 8);
        assert!(eval.importances.windows(2).all(|w| w[0].importance >= w[1].importance));
        assert!(eval.accuracy.is_some());
    }

    #[test]
    fn test_too_few_training_rows() {
        let (f, a, r) = fixture(60);
        let early = RiskPredictor::new(params());
        let late_cutoff = RiskPredictor::new(PredictorParams {
            cutoff: start() - Duration::days(1),
            ..params()
        });
        assert!(early.run(&f, &a, &r).is_ok());
        let err = late_cutoff.run(&f, &a, &r).unwrap_err();
        assert_eq!(err.row_counts(), Some((10, 0)));
    }

    #[test]
    fn test_metrics_from_outcomes() {
        let pairs = vec![
            (RiskLevel::High, RiskLevel::High),
            (RiskLevel::High, RiskLevel::Low),
            (RiskLevel::Low, RiskLevel::Low),
        ];
        let (confusion, classes, accuracy) = Evaluation::from_outcomes(&pairs);
        assert_eq!(confusion[3][1], 1);
        assert_relative_eq!(accuracy.unwrap(), 2.0 / 3.0);
        let high = &classes[3];
        assert_relative_eq!(high.precision, 1.0);
        assert_relative_eq!(high.recall, 0.5);
        assert_eq!(high.support, 2);
        assert_relative_eq!(classes[1].precision, 0.5);
    }
}
