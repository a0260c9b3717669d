//! Recommendation Engine
//!
//! Maps (historical class, projected class) to an action. "Stable" means
//! NORMAL or LOW_RISK.
//!
//! | current \ projected | stable               | MEDIUM    | HIGH            |
//! |---------------------|----------------------|-----------|-----------------|
//! | stable              | REINFORCE            | MONITOR   | REDUCE_EXPOSURE |
//! | MEDIUM              | IMPROVING_KEEP_WATCH | WATCHLIST | REDUCE_EXPOSURE |
//! | HIGH                | IMPROVING_KEEP_WATCH | WATCHLIST | REVIEW_STRATEGY |
//!
//! An instrument without history is always WATCHLIST.
//!
//! priority = 0.65 * projected + 0.35 * current + 0.75 * p(MEDIUM or HIGH),
//! rounded to 4 decimals, with a missing current class counting as 0.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Action, FundRiskSummary, Projection, Recommendation, RiskLevel};
use crate::strategy::params::RecommendationParams;
use crate::strategy::stats;

/// Decision table; total over every pair of levels
pub fn decide(current: Option<RiskLevel>, projected: RiskLevel) -> Action {
    let Some(current) = current else {
        return Action::Watchlist;
    };
    match (current, projected) {
        (c, p) if c.is_stable() && p.is_stable() => Action::Reinforce,
        (c, RiskLevel::Medium) if c.is_stable() => Action::Monitor,
        (RiskLevel::High, RiskLevel::High) => Action::ReviewStrategy,
        (_, RiskLevel::High) => Action::ReduceExposure,
        (RiskLevel::Medium | RiskLevel::High, p) if p.is_stable() => Action::ImprovingKeepWatch,
        _ => Action::Watchlist,
    }
}

/// Per-action rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub action: Action,
    pub funds: usize,
    pub avg_priority: f64,
    pub avg_projected_score: f64,
    pub avg_p_medium_or_high_pct: f64,
}

#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    params: RecommendationParams,
}

impl RecommendationEngine {
    pub fn new(params: RecommendationParams) -> Self {
        Self { params }
    }

    pub fn priority(&self, current: Option<RiskLevel>, projected: RiskLevel, p_medium_or_high_pct: f64) -> f64 {
        let current = current.map_or(0.0, |c| f64::from(c.ordinal()));
        let raw = self.params.projected_weight * f64::from(projected.ordinal())
            + self.params.current_weight * current
            + self.params.probability_weight * (p_medium_or_high_pct / 100.0);
        stats::round_to(raw, 4)
    }

    pub fn recommend_one(&self, projection: &Projection, history: Option<&FundRiskSummary>) -> Recommendation {
        let current_class = history.map(|h| h.final_class);
        let action = decide(current_class, projection.final_class);
        let priority = self.priority(current_class, projection.final_class, projection.p_medium_or_high_pct);

        let comment = format!(
            "Hist={} (score={}); Future30={} (score30={:.4}); P(M/H)30={:.2}",
            current_class.map_or("n/a", |c| c.label()),
            history.map_or_else(|| "n/a".to_string(), |h| format!("{:.4}", h.risk_score)),
            projection.final_class,
            projection.score,
            projection.p_medium_or_high_pct
        );

        Recommendation {
            code: projection.code.clone(),
            name: projection.name.clone().or_else(|| history.and_then(|h| h.name.clone())),
            company: projection
                .company
                .clone()
                .or_else(|| history.and_then(|h| h.company.clone())),
            current_class,
            current_score: history.map(|h| h.risk_score),
            pct_high: history.map(|h| h.pct_high),
            pct_medium_or_high: history.map(|h| h.pct_medium_or_high),
            projected_class: projection.final_class,
            projected_score: projection.score,
            p_high_pct: projection.p_high_pct,
            p_medium_or_high_pct: projection.p_medium_or_high_pct,
            predictions: projection.predictions,
            action,
            priority,
            comment,
        }
    }

    /// One recommendation per projected instrument, most urgent first
    pub fn recommend(&self, projections: &[Projection], summaries: &[FundRiskSummary]) -> Vec<Recommendation> {
        let history: BTreeMap<&str, &FundRiskSummary> =
            summaries.iter().map(|s| (s.code.as_str(), s)).collect();

        let mut recs: Vec<Recommendation> = projections
            .iter()
            .map(|p| self.recommend_one(p, history.get(p.code.as_str()).copied()))
            .collect();
        recs.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.p_medium_or_high_pct
                        .partial_cmp(&a.p_medium_or_high_pct)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.code.cmp(&b.code))
        });

        let missing = recs.iter().filter(|r| r.current_class.is_none()).count();
        if missing > 0 {
            tracing::warn!("recommendations: {} instruments have no risk history", missing);
        }
        tracing::info!("recommendations: {} instruments", recs.len());
        recs
    }
}

/// Count and averages per action, most frequent first
pub fn summarize_actions(recs: &[Recommendation]) -> Vec<ActionSummary> {
    let mut groups: BTreeMap<Action, Vec<&Recommendation>> = BTreeMap::new();
    for r in recs {
        groups.entry(r.action).or_default().push(r);
    }

    let mut out: Vec<ActionSummary> = groups
        .into_iter()
        .map(|(action, group)| {
            let n = group.len() as f64;
            let avg = |f: fn(&Recommendation) -> f64| group.iter().map(|r| f(r)).sum::<f64>() / n;
            ActionSummary {
                action,
                funds: group.len(),
                avg_priority: avg(|r| r.priority),
                avg_projected_score: avg(|r| r.projected_score),
                avg_p_medium_or_high_pct: avg(|r| r.p_medium_or_high_pct),
            }
        })
        .collect();
    out.sort_by(|a, b| b.funds.cmp(&a.funds).then(a.action.cmp(&b.action)));
    out
}
