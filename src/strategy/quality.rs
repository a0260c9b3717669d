//! Data-quality report over resolved observations

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Granularity, Observation};

/// Reported returns beyond this many percent are suspect
pub const SUSPECT_RETURN_PCT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectCount {
    pub rule: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub granularity: Granularity,
    pub rows: usize,
    pub instruments: usize,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub missing_value: usize,
    pub missing_period_return: usize,
    pub missing_week_return: usize,
    /// Repeated (instrument, date) pairs
    pub duplicates: usize,
    /// Rows dropped at schema resolution (bad date, empty or invalid code)
    pub dropped_rows: usize,
    pub suspects: Vec<SuspectCount>,
}

impl QualityReport {
    pub fn build(observations: &[Observation], granularity: Granularity, dropped_rows: usize) -> Self {
        let mut keys = BTreeSet::new();
        let mut duplicates = 0;
        for o in observations {
            if !keys.insert((o.code.as_str(), o.date)) {
                duplicates += 1;
            }
        }
        let instruments: BTreeSet<&str> = observations.iter().map(|o| o.code.as_str()).collect();
        let missing = |f: fn(&Observation) -> Option<f64>| observations.iter().filter(|o| f(o).is_none()).count();
        let beyond = |f: fn(&Observation) -> Option<f64>| {
            observations
                .iter()
                .filter(|o| f(o).map_or(false, |v| v.abs() > SUSPECT_RETURN_PCT))
                .count()
        };

        let suspects = vec![
            SuspectCount {
                rule: "VALUE<=0".to_string(),
                count: observations
                    .iter()
                    .filter(|o| o.value.map_or(false, |v| v <= 0.0))
                    .count(),
            },
            SuspectCount {
                rule: format!("PERIOD_RETURN abs>{}", SUSPECT_RETURN_PCT),
                count: beyond(|o| o.period_return_pct),
            },
            SuspectCount {
                rule: format!("WEEK_RETURN abs>{}", SUSPECT_RETURN_PCT),
                count: beyond(|o| o.week_return_pct),
            },
        ];

        let report = Self {
            granularity,
            rows: observations.len(),
            instruments: instruments.len(),
            min_date: observations.iter().map(|o| o.date).min(),
            max_date: observations.iter().map(|o| o.date).max(),
            missing_value: missing(|o| o.value),
            missing_period_return: missing(|o| o.period_return_pct),
            missing_week_return: missing(|o| o.week_return_pct),
            duplicates,
            dropped_rows,
            suspects,
        };

        tracing::info!(
            "{} quality: {} rows, {} instruments, {} duplicates, {} dropped",
            granularity,
            report.rows,
            report.instruments,
            report.duplicates,
            report.dropped_rows
        );
        report
    }

    pub fn suspect_total(&self) -> usize {
        self.suspects.iter().map(|s| s.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_quality_counts() {
        let obs = vec![
            Observation::new("MA1", date(1)).with_value(100.0).with_period_return(0.5),
            Observation::new("MA1", date(1)).with_value(101.0),
            Observation::new("MA1", date(2)).with_value(-1.0).with_period_return(75.0),
            Observation::new("MA2", date(3)).with_week_return(-60.0),
        ];
        let report = QualityReport::build(&obs, Granularity::Daily, 2);

        assert_eq!(report.rows, 4);
        assert_eq!(report.instruments, 2);
        assert_eq!(report.min_date, Some(date(1)));
        assert_eq!(report.max_date, Some(date(3)));
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.dropped_rows, 2);
        assert_eq!(report.missing_value, 1);
        assert_eq!(report.missing_period_return, 2);
        assert_eq!(report.missing_week_return, 3);
        assert_eq!(report.suspects[0].count, 1);
        assert_eq!(report.suspects[1].count, 1);
        assert_eq!(report.suspects[2].count, 1);
        assert_eq!(report.suspect_total(), 3);
    }

    #[test]
    fn test_empty_feed() {
        let report = QualityReport::build(&[], Granularity::Weekly, 0);
        assert_eq!(report.rows, 0);
        assert_eq!(report.min_date, None);
        assert_eq!(report.suspect_total(), 0);
    }
}
