//! Forward Projector
//!
//! Collapses each instrument's next-period predictions into a 30-day outlook:
//!
//!   score = 0.6 * mean(predicted ordinal) + 0.4 * (share >= MEDIUM) * 3
//!
//! and classifies the score against descending thresholds (2.4 / 1.6 / 0.8).

use crate::domain::{partition_by_code, InstrumentDirectory, Prediction, Projection, RiskLevel};
use crate::strategy::params::ProjectionParams;

#[derive(Debug, Clone)]
pub struct ForwardProjector {
    params: ProjectionParams,
}

impl ForwardProjector {
    pub fn new(params: ProjectionParams) -> Self {
        Self { params }
    }

    pub fn score(&self, avg_level: f64, share_medium_or_high: f64) -> f64 {
        self.params.avg_weight * avg_level + self.params.share_weight * (share_medium_or_high * 3.0)
    }

    pub fn classify(&self, score: f64) -> RiskLevel {
        if score >= self.params.high_threshold {
            RiskLevel::High
        } else if score >= self.params.medium_threshold {
            RiskLevel::Medium
        } else if score >= self.params.low_threshold {
            RiskLevel::Low
        } else {
            RiskLevel::Normal
        }
    }

    /// Projection for one instrument's date-ordered predictions
    pub fn project_instrument(
        &self,
        predictions: &[Prediction],
        directory: &InstrumentDirectory,
    ) -> Option<Projection> {
        let window = match self.params.lookback {
            Some(n) if n < predictions.len() => &predictions[predictions.len() - n..],
            _ => predictions,
        };
        let last = window.last()?;
        let n = window.len() as f64;

        let avg_level = window
            .iter()
            .map(|p| f64::from(p.predicted_next.ordinal()))
            .sum::<f64>()
            / n;
        let share_high = window
            .iter()
            .filter(|p| p.predicted_next == RiskLevel::High)
            .count() as f64
            / n;
        let share_medium_or_high = window
            .iter()
            .filter(|p| p.predicted_next.is_medium_or_higher())
            .count() as f64
            / n;
        let score = self.score(avg_level, share_medium_or_high);

        Some(Projection {
            code: last.code.clone(),
            name: directory.name_of(&last.code),
            company: directory.company_of(&last.code),
            last_predicted: last.predicted_next,
            avg_level,
            share_high,
            share_medium_or_high,
            predictions: window.len(),
            score,
            final_class: self.classify(score),
            p_high_pct: share_high * 100.0,
            p_medium_or_high_pct: share_medium_or_high * 100.0,
        })
    }

    /// One projection per instrument with at least one prediction, ordered by code
    pub fn project(&self, predictions: &[Prediction], directory: &InstrumentDirectory) -> Vec<Projection> {
        let mut sorted = predictions.to_vec();
        sorted.sort_by(|a, b| a.code.cmp(&b.code).then(a.date.cmp(&b.date)));

        let projections: Vec<Projection> = partition_by_code(&sorted, |p| p.code.as_str())
            .into_iter()
            .filter_map(|part| self.project_instrument(part, directory))
            .collect();

        tracing::info!(
            "projection: {} instruments, {} projected HIGH_RISK",
            projections.len(),
            projections.iter().filter(|p| p.final_class == RiskLevel::High).count()
        );
        projections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn predictions(code: &str, levels: &[u8]) -> Vec<Prediction> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        levels
            .iter()
            .enumerate()
            .map(|(i, &l)| Prediction {
                code: code.to_string(),
                date: start + Duration::days(i as i64),
                actual_next: RiskLevel::Normal,
                predicted_next: RiskLevel::from_ordinal(l).unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_score_and_shares() {
        let projector = ForwardProjector::new(ProjectionParams::default());
        let p = projector
            .project_instrument(&predictions("MA1", &[3, 3, 2, 1]), &InstrumentDirectory::new())
            .unwrap();
        assert_relative_eq!(p.avg_level, 2.25);
        assert_relative_eq!(p.share_high, 0.5);
        assert_relative_eq!(p.share_medium_or_high, 0.75);
        assert_relative_eq!(p.score, 0.6 * 2.25 + 0.4 * 2.25, epsilon = 1e-12);
        assert_eq!(p.final_class, RiskLevel::Medium);
        assert_relative_eq!(p.p_medium_or_high_pct, 75.0);
        assert_eq!(p.last_predicted, RiskLevel::Low);
        assert_eq!(p.predictions, 4);
    }

    #[test]
    fn test_class_thresholds() {
        let projector = ForwardProjector::new(ProjectionParams::default());
        assert_eq!(projector.classify(2.4), RiskLevel::High);
        assert_eq!(projector.classify(2.39), RiskLevel::Medium);
        assert_eq!(projector.classify(1.6), RiskLevel::Medium);
        assert_eq!(projector.classify(0.8), RiskLevel::Low);
        assert_eq!(projector.classify(0.79), RiskLevel::Normal);
    }

    #[test]
    fn test_all_high_is_high() {
        let projector = ForwardProjector::new(ProjectionParams::default());
        let p = projector
            .project_instrument(&predictions("MA1", &[3; 10]), &InstrumentDirectory::new())
            .unwrap();
        assert_relative_eq!(p.score, 3.0, epsilon = 1e-12);
        assert_eq!(p.final_class, RiskLevel::High);
    }

    #[test]
    fn test_lookback_keeps_latest() {
        let projector = ForwardProjector::new(ProjectionParams {
            lookback: Some(2),
            ..Default::default()
        });
        let p = projector
            .project_instrument(&predictions("MA1", &[3, 3, 3, 0, 0]), &InstrumentDirectory::new())
            .unwrap();
        assert_eq!(p.predictions, 2);
        assert_eq!(p.final_class, RiskLevel::Normal);
    }

    #[test]
    fn test_project_groups_by_instrument() {
        let mut all = predictions("MA2", &[0, 0]);
        all.extend(predictions("MA1", &[2]));
        let out = ForwardProjector::new(ProjectionParams::default()).project(&all, &InstrumentDirectory::new());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].code, "MA1");
        assert_eq!(out[1].final_class, RiskLevel::Normal);
    }
}
