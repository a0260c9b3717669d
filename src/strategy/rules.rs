//! Rule Scorer
//!
//! Deterministic threshold rules, one point per triggered rule.
//!
//! Scoring is two-phase. `RuleThresholds::calibrate` makes one pass over the
//! whole feed to fix the cross-sectional volatility cutoff, producing an
//! immutable bundle. `RuleThresholds::score` is then a pure per-row function.
//!
//! Daily rules: |z| > 3, |z(1 week)| > 3, volatility > p99, drawdown < -10%.
//! Weekly rules: |z| > 3, volatility > p99, drawdown < -15%, momentum(4) < momentum(12).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{FeatureVector, Granularity};
use crate::strategy::params::RuleParams;
use crate::strategy::stats;

/// Number of rules evaluated per row, for either granularity
pub const RULE_COUNT: u8 = 4;

/// Frozen thresholds for one feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    pub granularity: Granularity,
    pub z_threshold: f64,
    /// Volatility quantile over the whole feed; `None` if no volatility is defined
    pub volatility_cutoff: Option<f64>,
    pub drawdown_floor: f64,
}

impl RuleThresholds {
    /// Compute global statistics over the full feed
    pub fn calibrate(rows: &[FeatureVector], granularity: Granularity, params: &RuleParams) -> Self {
        let vols: Vec<f64> = rows.iter().filter_map(|r| r.volatility).collect();
        let volatility_cutoff = stats::quantile(&vols, params.volatility_quantile);
        let drawdown_floor = match granularity {
            Granularity::Daily => params.daily_drawdown,
            Granularity::Weekly => params.weekly_drawdown,
        };

        tracing::debug!(
            "{} rule thresholds: |z| > {}, volatility > {:?} (q={}), drawdown < {}",
            granularity,
            params.z_threshold,
            volatility_cutoff,
            params.volatility_quantile,
            drawdown_floor
        );

        Self {
            granularity,
            z_threshold: params.z_threshold,
            volatility_cutoff,
            drawdown_floor,
        }
    }

    /// Count triggered rules for one row. Missing features never trigger.
    pub fn score(&self, row: &FeatureVector) -> u8 {
        let above_z = |z: Option<f64>| z.map_or(false, |z| z.abs() > self.z_threshold);
        let high_vol = match (row.volatility, self.volatility_cutoff) {
            (Some(v), Some(cut)) => v > cut,
            _ => false,
        };
        let deep_drawdown = row.drawdown.map_or(false, |d| d < self.drawdown_floor);

        let fired = match self.granularity {
            Granularity::Daily => [
                above_z(row.z_score),
                above_z(row.z_score_week),
                high_vol,
                deep_drawdown,
            ],
            Granularity::Weekly => {
                let fading_momentum = match (row.momentum_short, row.momentum_long) {
                    (Some(s), Some(l)) => s < l,
                    _ => false,
                };
                [above_z(row.z_score), high_vol, deep_drawdown, fading_momentum]
            }
        };
        fired.iter().filter(|&&f| f).count() as u8
    }

    pub fn score_all(&self, rows: &[FeatureVector]) -> Vec<u8> {
        rows.par_iter().map(|r| self.score(r)).collect()
    }
}
