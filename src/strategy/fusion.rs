//! Signal Fusion
//!
//! Aligns each daily anomaly flag with the most recent weekly flag of the
//! same instrument dated on or before it (backward as-of join), then maps the
//! weighted sum to a risk level. Weekly records dated after the daily row are
//! never visible to it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::domain::{partition_by_code, AnomalyScore, RiskLevel, RiskRecord};
use crate::strategy::params::FusionParams;

/// Weekly flags per instrument, ascending by date
#[derive(Debug, Clone, Default)]
pub struct WeeklyIndex {
    by_code: BTreeMap<String, Vec<(NaiveDate, u8)>>,
}

impl WeeklyIndex {
    pub fn build<'a>(weekly: impl IntoIterator<Item = &'a AnomalyScore>) -> Self {
        let mut by_code: BTreeMap<String, Vec<(NaiveDate, u8)>> = BTreeMap::new();
        for w in weekly {
            by_code
                .entry(w.code.clone())
                .or_default()
                .push((w.date, w.outlier_flag));
        }
        for series in by_code.values_mut() {
            series.sort_by_key(|(date, _)| *date);
        }
        Self { by_code }
    }

    /// Latest weekly record with date <= `date`
    pub fn as_of(&self, code: &str, date: NaiveDate) -> Option<(NaiveDate, u8)> {
        let series = self.by_code.get(code)?;
        let idx = series.partition_point(|(d, _)| *d <= date);
        idx.checked_sub(1).map(|i| series[i])
    }

    pub fn instrument_count(&self) -> usize {
        self.by_code.len()
    }
}

#[derive(Debug, Clone)]
pub struct SignalFusion {
    params: FusionParams,
    /// Also fuse rows the outlier model could not score (fallback mode)
    include_unscored: bool,
}

impl SignalFusion {
    pub fn new(params: FusionParams) -> Self {
        Self {
            params,
            include_unscored: false,
        }
    }

    pub fn with_unscored(mut self, include: bool) -> Self {
        self.include_unscored = include;
        self
    }

    fn eligible(&self, score: &AnomalyScore) -> bool {
        self.include_unscored || score.is_scored()
    }

    pub fn level(&self, weekly_flag: u8, daily_flag: u8) -> (u8, RiskLevel) {
        let combined = self.params.combine(weekly_flag, daily_flag);
        (combined, RiskLevel::from_combined_score(combined))
    }

    /// Fuse daily scores with weekly scores into one record per daily row
    pub fn fuse(&self, daily: &[AnomalyScore], weekly: &[AnomalyScore]) -> Vec<RiskRecord> {
        let index = WeeklyIndex::build(weekly.iter().filter(|w| self.eligible(w)));

        let mut rows: Vec<&AnomalyScore> = daily.iter().filter(|d| self.eligible(d)).collect();
        rows.sort_by(|a, b| a.code.cmp(&b.code).then(a.date.cmp(&b.date)));

        let records: Vec<RiskRecord> = partition_by_code(&rows, |d| d.code.as_str())
            .par_iter()
            .map(|part| {
                part.iter()
                    .map(|d| {
                        let matched = index.as_of(&d.code, d.date);
                        let weekly_flag = matched.map_or(0, |(_, flag)| flag);
                        let (combined_score, level) = self.level(weekly_flag, d.outlier_flag);
                        RiskRecord {
                            code: d.code.clone(),
                            date: d.date,
                            daily_flag: d.outlier_flag,
                            weekly_flag,
                            weekly_date: matched.map(|(date, _)| date),
                            combined_score,
                            level,
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        let unmatched = records.iter().filter(|r| r.weekly_date.is_none()).count();
        if unmatched > 0 {
            tracing::warn!(
                "fusion: {} daily rows have no weekly record on or before their date (weekly flag 0)",
                unmatched
            );
        }
        tracing::info!(
            "fusion: {} risk records over {} instruments ({} with weekly history)",
            records.len(),
            partition_by_code(&records, |r| r.code.as_str()).len(),
            index.instrument_count()
        );
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn score(code: &str, date: NaiveDate, flag: u8) -> AnomalyScore {
        AnomalyScore {
            code: code.to_string(),
            date,
            outlier_score: Some(if flag == 1 { -0.1 } else { 0.1 }),
            outlier_flag: flag,
            rule_score: 0,
        }
    }

    #[test]
    fn test_as_of_never_looks_ahead() {
        let weekly = vec![score("MA1", date(1, 5), 1), score("MA1", date(1, 12), 0)];
        let daily = vec![
            score("MA1", date(1, 4), 0),
            score("MA1", date(1, 5), 0),
            score("MA1", date(1, 11), 0),
            score("MA1", date(1, 12), 1),
        ];
        let out = SignalFusion::new(FusionParams::default()).fuse(&daily, &weekly);

        assert_eq!(out[0].weekly_date, None);
        assert_eq!(out[0].weekly_flag, 0);
        assert_eq!(out[1].weekly_date, Some(date(1, 5)));
        assert_eq!(out[2].weekly_date, Some(date(1, 5)));
        assert_eq!(out[2].level, RiskLevel::Medium);
        assert_eq!(out[3].weekly_date, Some(date(1, 12)));
        assert_eq!(out[3].level, RiskLevel::Low);
        for r in &out {
            if let Some(w) = r.weekly_date {
                assert!(w <= r.date);
            }
        }
    }

    #[test]
    fn test_combined_score_range() {
        let fusion = SignalFusion::new(FusionParams::default());
        let mut seen = Vec::new();
        for w in 0..=1 {
            for d in 0..=1 {
                let (combined, level) = fusion.level(w, d);
                assert!(combined <= 3);
                seen.push((combined, level));
            }
        }
        seen.sort();
        assert_eq!(
            seen.iter().map(|(_, l)| *l).collect::<Vec<_>>(),
            vec![RiskLevel::Normal, RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
        );
    }

    #[test]
    fn test_instruments_do_not_share_weekly_flags() {
        let weekly = vec![score("MA2", date(1, 1), 1)];
        let daily = vec![score("MA1", date(1, 10), 1), score("MA2", date(1, 10), 0)];
        let out = SignalFusion::new(FusionParams::default()).fuse(&daily, &weekly);
        assert_eq!(out[0].code, "MA1");
        assert_eq!(out[0].weekly_flag, 0);
        assert_eq!(out[0].level, RiskLevel::Low);
        assert_eq!(out[1].weekly_flag, 1);
        assert_eq!(out[1].level, RiskLevel::Medium);
    }

    #[test]
    fn test_unscored_rows_skipped_unless_fallback() {
        let mut unscored = score("MA1", date(1, 8), 1);
        unscored.outlier_score = None;
        let weekly = vec![score("MA1", date(1, 1), 0), unscored.clone()];
        let daily = vec![score("MA1", date(1, 9), 0), {
            let mut d = unscored.clone();
            d.date = date(1, 10);
            d
        }];

        let strict = SignalFusion::new(FusionParams::default()).fuse(&daily, &weekly);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].weekly_date, Some(date(1, 1)));

        let lenient = SignalFusion::new(FusionParams::default())
            .with_unscored(true)
            .fuse(&daily, &weekly);
        assert_eq!(lenient.len(), 2);
        assert_eq!(lenient[0].weekly_date, Some(date(1, 8)));
        assert_eq!(lenient[1].level, RiskLevel::High);
    }

    #[test]
    fn test_custom_weights_clamp_to_high() {
        let fusion = SignalFusion::new(FusionParams {
            weekly_weight: 3,
            daily_weight: 2,
        });
        assert_eq!(fusion.level(1, 1), (5, RiskLevel::High));
    }
}
