//! Risk Aggregator
//!
//! Summarizes each instrument's full risk history into counts, a mean point
//! score and a final class:
//!
//!   %HIGH >= 10            => HIGH_RISK
//!   %MEDIUM_OR_HIGH >= 20  => MEDIUM_RISK
//!   otherwise              => LOW_RISK
//!
//! NORMAL is never assigned as a final class.

use std::cmp::Ordering;

use crate::domain::{partition_by_code, FundRiskSummary, InstrumentDirectory, RiskLevel, RiskRecord};
use crate::strategy::params::AggregationParams;

#[derive(Debug, Clone)]
pub struct RiskAggregator {
    params: AggregationParams,
}

impl RiskAggregator {
    pub fn new(params: AggregationParams) -> Self {
        Self { params }
    }

    pub fn classify(&self, pct_high: f64, pct_medium_or_high: f64) -> RiskLevel {
        if pct_high >= self.params.high_pct_threshold {
            RiskLevel::High
        } else if pct_medium_or_high >= self.params.medium_or_high_pct_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Summarize one instrument's date-ordered history; `None` if empty
    pub fn summarize_instrument(
        &self,
        history: &[RiskRecord],
        directory: &InstrumentDirectory,
    ) -> Option<FundRiskSummary> {
        let last = history.last()?;
        let count = |level: RiskLevel| history.iter().filter(|r| r.level == level).count();
        let total_days = history.len();
        let high_days = count(RiskLevel::High);
        let medium_days = count(RiskLevel::Medium);

        let points: f64 = history.iter().map(|r| self.params.points.points(r.level)).sum();
        let risk_score = points / total_days as f64;
        let pct_high = high_days as f64 / total_days as f64 * 100.0;
        let pct_medium_or_high = (high_days + medium_days) as f64 / total_days as f64 * 100.0;

        Some(FundRiskSummary {
            code: last.code.clone(),
            name: directory.name_of(&last.code),
            company: directory.company_of(&last.code),
            total_days,
            high_days,
            medium_days,
            low_days: count(RiskLevel::Low),
            normal_days: count(RiskLevel::Normal),
            risk_score,
            pct_high,
            pct_medium_or_high,
            last_level: last.level,
            final_class: self.classify(pct_high, pct_medium_or_high),
        })
    }

    /// One summary per instrument, highest risk score first
    pub fn summarize(
        &self,
        records: &[RiskRecord],
        directory: &InstrumentDirectory,
    ) -> Vec<FundRiskSummary> {
        let mut sorted: Vec<RiskRecord> = records.to_vec();
        sorted.sort_by(|a, b| a.code.cmp(&b.code).then(a.date.cmp(&b.date)));

        let mut summaries: Vec<FundRiskSummary> = partition_by_code(&sorted, |r| r.code.as_str())
            .into_iter()
            .filter_map(|part| self.summarize_instrument(part, directory))
            .collect();
        sort_by_risk(&mut summaries);

        let high = summaries.iter().filter(|s| s.final_class == RiskLevel::High).count();
        let medium = summaries.iter().filter(|s| s.final_class == RiskLevel::Medium).count();
        tracing::info!(
            "risk summaries: {} funds ({} HIGH_RISK, {} MEDIUM_RISK)",
            summaries.len(),
            high,
            medium
        );
        summaries
    }
}

/// Order by risk score descending, ties by code
pub fn sort_by_risk(summaries: &mut [FundRiskSummary]) {
    summaries.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });
}
