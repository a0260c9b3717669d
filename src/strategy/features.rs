//! Feature Engine
//!
//! Per-instrument time-series transforms over ordered observations:
//! - Return: pct-change of the net asset value, else reported return / 100
//! - Z-score: (x - mean) / population std over the instrument's history
//! - Volatility: trailing sample std of returns (20 daily / 12 weekly)
//! - Drawdown: (value - running max) / running max
//! - Momentum (weekly): trailing mean return over short and long horizons
//!
//! Instruments are independent, so partitions are processed in parallel.

use rayon::prelude::*;

use crate::domain::{
    partition_by_code, sort_and_dedup, FeatureVector, Granularity, Observation,
};
use crate::strategy::params::FeatureParams;
use crate::strategy::stats;

/// Feature rows for one feed, same cardinality as the deduplicated input
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub granularity: Granularity,
    pub rows: Vec<FeatureVector>,
    /// Duplicate (instrument, date) rows dropped before computing
    pub duplicates_removed: usize,
}

impl FeatureSet {
    /// Rows with every outlier-model input defined
    pub fn model_ready(&self) -> impl Iterator<Item = &FeatureVector> {
        self.rows.iter().filter(|r| r.is_model_ready())
    }

    /// Rows kept in the dataset but excluded from modeling
    pub fn excluded_count(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_model_ready()).count()
    }

    pub fn instrument_count(&self) -> usize {
        partition_by_code(&self.rows, |r| r.code.as_str()).len()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureEngine {
    params: FeatureParams,
}

impl FeatureEngine {
    pub fn new(params: FeatureParams) -> Self {
        Self { params }
    }

    pub fn window(&self, granularity: Granularity) -> usize {
        match granularity {
            Granularity::Daily => self.params.daily_window,
            Granularity::Weekly => self.params.weekly_window,
        }
    }

    /// Compute features for every observation of a feed
    pub fn compute(&self, observations: &[Observation], granularity: Granularity) -> FeatureSet {
        let (sorted, duplicates_removed) = sort_and_dedup(observations.to_vec());
        if duplicates_removed > 0 {
            tracing::warn!(
                "{} feed: dropped {} duplicate (instrument, date) rows, last write kept",
                granularity,
                duplicates_removed
            );
        }

        let partitions = partition_by_code(&sorted, |o| o.code.as_str());
        let rows: Vec<FeatureVector> = partitions
            .par_iter()
            .map(|part| self.instrument_features(part, granularity))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        let set = FeatureSet {
            granularity,
            rows,
            duplicates_removed,
        };

        let excluded = set.excluded_count();
        tracing::info!(
            "{} features: {} rows over {} instruments, {} excluded from modeling (missing inputs)",
            granularity,
            set.rows.len(),
            partitions.len(),
            excluded
        );
        set
    }

    /// Features for one instrument's ordered, deduplicated history
    pub fn instrument_features(
        &self,
        history: &[Observation],
        granularity: Granularity,
    ) -> Vec<FeatureVector> {
        let values: Vec<Option<f64>> = history
            .iter()
            .map(|o| o.value.and_then(stats::finite))
            .collect();
        let returns = period_returns(history, &values);

        let z = stats::zscores(&returns);
        let vol = stats::rolling_std(&returns, self.window(granularity));
        let dd = stats::drawdowns(&values);

        let (z_week, mom_short, mom_long) = match granularity {
            Granularity::Daily => {
                let week: Vec<Option<f64>> = history.iter().map(|o| o.week_return_pct).collect();
                let n = history.len();
                (stats::zscores(&week), vec![None; n], vec![None; n])
            }
            Granularity::Weekly => (
                vec![None; history.len()],
                stats::rolling_mean(&returns, self.params.momentum_short),
                stats::rolling_mean(&returns, self.params.momentum_long),
            ),
        };

        history
            .iter()
            .enumerate()
            .map(|(i, obs)| FeatureVector {
                code: obs.code.clone(),
                date: obs.date,
                granularity,
                value: values[i],
                ret: returns[i],
                z_score: z[i],
                z_score_week: z_week[i],
                volatility: vol[i],
                drawdown: dd[i],
                momentum_short: mom_short[i],
                momentum_long: mom_long[i],
            })
            .collect()
    }
}

/// Period returns: NAV pct-change; the reported return only where the NAV is absent
fn period_returns(history: &[Observation], values: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..history.len())
        .map(|i| match values[i] {
            Some(cur) if i > 0 => values[i - 1].and_then(|prev| stats::pct_change(prev, cur)),
            Some(_) => None,
            None => history[i]
                .period_return_pct
                .and_then(|pct| stats::finite(pct / 100.0)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn nav_series(code: &str, values: &[f64], step_days: i64) -> Vec<Observation> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                Observation::new(code, start() + Duration::days(i as i64 * step_days)).with_value(v)
            })
            .collect()
    }

    #[test]
    fn test_returns_are_pct_change_of_nav() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64).sin() * 3.0 + i as f64).collect();
        let engine = FeatureEngine::new(FeatureParams::default());
        let set = engine.compute(&nav_series("MA1", &values, 1), Granularity::Daily);

        assert_eq!(set.rows.len(), values.len());
        assert!(set.rows[0].ret.is_none());
        for i in 1..values.len() {
            let expected = (values[i] - values[i - 1]) / values[i - 1];
            assert_relative_eq!(set.rows[i].ret.unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_reported_return_fallback() {
        let obs = vec![
            Observation::new("MA1", start()).with_period_return(1.5),
            Observation::new("MA1", start() + Duration::days(1)).with_period_return(-0.5),
        ];
        let engine = FeatureEngine::new(FeatureParams::default());
        let rows = engine.instrument_features(&obs, Granularity::Daily);
        assert_relative_eq!(rows[0].ret.unwrap(), 0.015, epsilon = 1e-12);
        assert_relative_eq!(rows[1].ret.unwrap(), -0.005, epsilon = 1e-12);
        assert!(rows[0].drawdown.is_none());
    }

    #[test]
    fn test_reported_return_ignored_when_nav_present() {
        let day = |i: i64| start() + Duration::days(i);
        let obs = vec![
            Observation::new("MA1", day(0)).with_value(100.0).with_period_return(7.0),
            Observation::new("MA1", day(1)).with_period_return(7.0),
            Observation::new("MA1", day(2)).with_value(110.0).with_period_return(7.0),
            Observation::new("MA1", day(3)).with_value(121.0).with_period_return(7.0),
        ];
        let engine = FeatureEngine::new(FeatureParams::default());
        let rows = engine.instrument_features(&obs, Granularity::Daily);

        assert!(rows[0].ret.is_none());
        assert_relative_eq!(rows[1].ret.unwrap(), 0.07, epsilon = 1e-12);
        assert!(rows[2].ret.is_none());
        assert_relative_eq!(rows[3].ret.unwrap(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_nav_yields_missing_not_infinite() {
        let obs = nav_series("MA1", &[0.0, 10.0, 11.0], 1);
        let engine = FeatureEngine::new(FeatureParams::default());
        let rows = engine.instrument_features(&obs, Granularity::Daily);
        assert!(rows[1].ret.is_none());
        assert!(rows[2].ret.is_some());
    }

    #[test]
    fn test_volatility_needs_full_window_of_returns() {
        let values: Vec<f64> = (0..25).map(|i| 100.0 * 1.01f64.powi(i) + (i % 3) as f64).collect();
        let engine = FeatureEngine::new(FeatureParams::default());
        let rows = engine.instrument_features(&nav_series("MA1", &values, 1), Granularity::Daily);

        // first return is undefined, so the first full window ends at index 20
        assert!(rows[..20].iter().all(|r| r.volatility.is_none()));
        assert!(rows[20..].iter().all(|r| r.volatility.is_some()));
    }

    #[test]
    fn test_weekly_momentum_and_window() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 0.5 + (i % 2) as f64).collect();
        let engine = FeatureEngine::new(FeatureParams::default());
        let rows = engine.instrument_features(&nav_series("MA1", &values, 7), Granularity::Weekly);

        assert!(rows[4].momentum_short.is_some());
        assert!(rows[3].momentum_short.is_none());
        assert!(rows[11].momentum_long.is_none());
        assert!(rows[12].momentum_long.is_some());
        assert!(rows[12].volatility.is_some());
        assert!(rows.iter().all(|r| r.z_score_week.is_none()));
        assert!(rows[12].is_model_ready());
    }

    #[test]
    fn test_daily_week_zscore_from_reported_performance() {
        let obs: Vec<Observation> = (0..5)
            .map(|i| {
                Observation::new("MA1", start() + Duration::days(i))
                    .with_value(100.0 + i as f64)
                    .with_week_return(i as f64)
            })
            .collect();
        let engine = FeatureEngine::new(FeatureParams::default());
        let rows = engine.instrument_features(&obs, Granularity::Daily);
        assert_relative_eq!(rows[2].z_score_week.unwrap(), 0.0, epsilon = 1e-12);
        assert!(rows[4].z_score_week.unwrap() > 1.0);
    }

    #[test]
    fn test_instruments_are_independent() {
        let mut obs = nav_series("MA1", &[100.0, 50.0, 60.0], 1);
        obs.extend(nav_series("MA2", &[10.0, 11.0, 12.0], 1));
        let engine = FeatureEngine::new(FeatureParams::default());
        let set = engine.compute(&obs, Granularity::Daily);

        assert_eq!(set.instrument_count(), 2);
        let ma2_first = set.rows.iter().find(|r| r.code == "MA2").unwrap();
        assert!(ma2_first.ret.is_none());
        assert_eq!(ma2_first.drawdown, Some(0.0));
    }

    #[test]
    fn test_excluded_rows_are_retained() {
        let values: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let engine = FeatureEngine::new(FeatureParams::default());
        let set = engine.compute(&nav_series("MA1", &values, 1), Granularity::Daily);
        assert_eq!(set.rows.len(), 10);
        assert_eq!(set.excluded_count(), 10);
        assert_eq!(set.model_ready().count(), 0);
    }
}
