//! Peer-group comparison
//!
//! Splits instruments on a company pattern (case-insensitive substring) and
//! compares the group with the rest of the market, both on historical
//! summaries and on 30-day projections.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{company_contains, FundRiskSummary, Projection, Recommendation, RiskLevel};
use crate::strategy::stats;

const UNKNOWN_COMPANY: &str = "UNKNOWN";

fn share_pct<T>(items: &[&T], pred: impl Fn(&T) -> bool) -> Option<f64> {
    if items.is_empty() {
        return None;
    }
    Some(items.iter().filter(|i| pred(i)).count() as f64 / items.len() as f64 * 100.0)
}

fn diff(group: Option<f64>, market: Option<f64>) -> Option<f64> {
    Some(group? - market?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalStats {
    pub funds: usize,
    pub avg_risk_score: Option<f64>,
    pub median_risk_score: Option<f64>,
    pub std_risk_score: Option<f64>,
    pub avg_pct_high: Option<f64>,
    pub avg_pct_medium_or_high: Option<f64>,
    pub pct_funds_high: Option<f64>,
    pub pct_funds_medium_or_high: Option<f64>,
}

impl HistoricalStats {
    pub fn from_summaries(funds: &[&FundRiskSummary]) -> Self {
        let scores: Vec<f64> = funds.iter().map(|f| f.risk_score).collect();
        let highs: Vec<f64> = funds.iter().map(|f| f.pct_high).collect();
        let moh: Vec<f64> = funds.iter().map(|f| f.pct_medium_or_high).collect();
        Self {
            funds: funds.len(),
            avg_risk_score: stats::mean(&scores),
            median_risk_score: stats::median(&scores),
            std_risk_score: stats::sample_std(&scores),
            avg_pct_high: stats::mean(&highs),
            avg_pct_medium_or_high: stats::mean(&moh),
            pct_funds_high: share_pct(funds, |f| f.final_class == RiskLevel::High),
            pct_funds_medium_or_high: share_pct(funds, |f| f.final_class.is_medium_or_higher()),
        }
    }

    /// Group minus market, metric by metric
    pub fn delta(&self, market: &HistoricalStats) -> HistoricalDelta {
        HistoricalDelta {
            funds: self.funds as i64 - market.funds as i64,
            avg_risk_score: diff(self.avg_risk_score, market.avg_risk_score),
            median_risk_score: diff(self.median_risk_score, market.median_risk_score),
            std_risk_score: diff(self.std_risk_score, market.std_risk_score),
            avg_pct_high: diff(self.avg_pct_high, market.avg_pct_high),
            avg_pct_medium_or_high: diff(self.avg_pct_medium_or_high, market.avg_pct_medium_or_high),
            pct_funds_high: diff(self.pct_funds_high, market.pct_funds_high),
            pct_funds_medium_or_high: diff(self.pct_funds_medium_or_high, market.pct_funds_medium_or_high),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDelta {
    pub funds: i64,
    pub avg_risk_score: Option<f64>,
    pub median_risk_score: Option<f64>,
    pub std_risk_score: Option<f64>,
    pub avg_pct_high: Option<f64>,
    pub avg_pct_medium_or_high: Option<f64>,
    pub pct_funds_high: Option<f64>,
    pub pct_funds_medium_or_high: Option<f64>,
}

/// Share of funds per final class, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassShare {
    pub level: RiskLevel,
    pub group_pct: f64,
    pub market_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalComparison {
    pub group: HistoricalStats,
    pub market: HistoricalStats,
    pub delta: HistoricalDelta,
    pub distribution: Vec<ClassShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedStats {
    pub funds: usize,
    pub avg_score: Option<f64>,
    pub avg_p_high_pct: Option<f64>,
    pub avg_p_medium_or_high_pct: Option<f64>,
    pub pct_funds_high: Option<f64>,
    pub pct_funds_medium_or_high: Option<f64>,
}

impl ProjectedStats {
    pub fn from_projections(funds: &[&Projection]) -> Self {
        let scores: Vec<f64> = funds.iter().map(|p| p.score).collect();
        let p_high: Vec<f64> = funds.iter().map(|p| p.p_high_pct).collect();
        let p_moh: Vec<f64> = funds.iter().map(|p| p.p_medium_or_high_pct).collect();
        Self {
            funds: funds.len(),
            avg_score: stats::mean(&scores),
            avg_p_high_pct: stats::mean(&p_high),
            avg_p_medium_or_high_pct: stats::mean(&p_moh),
            pct_funds_high: share_pct(funds, |p| p.final_class == RiskLevel::High),
            pct_funds_medium_or_high: share_pct(funds, |p| p.final_class.is_medium_or_higher()),
        }
    }
}

/// Projected statistics for one company outside the group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProjection {
    pub company: String,
    pub stats: ProjectedStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedComparison {
    pub group: ProjectedStats,
    pub market: ProjectedStats,
    /// Rest of market per company, highest mean score first
    pub by_company: Vec<CompanyProjection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReport {
    pub pattern: String,
    pub historical: HistoricalComparison,
    pub projected: ProjectedComparison,
    pub group_summaries: Vec<FundRiskSummary>,
    pub group_projections: Vec<Projection>,
    pub group_recommendations: Vec<Recommendation>,
}

pub fn compare_history(pattern: &str, summaries: &[FundRiskSummary]) -> HistoricalComparison {
    let (group, market): (Vec<&FundRiskSummary>, Vec<&FundRiskSummary>) = summaries
        .iter()
        .partition(|s| company_contains(s.company.as_deref(), pattern));

    let group_stats = HistoricalStats::from_summaries(&group);
    let market_stats = HistoricalStats::from_summaries(&market);
    let distribution = RiskLevel::ALL
        .iter()
        .map(|&level| ClassShare {
            level,
            group_pct: stats::round_to(share_pct(&group, |s| s.final_class == level).unwrap_or(0.0), 2),
            market_pct: stats::round_to(share_pct(&market, |s| s.final_class == level).unwrap_or(0.0), 2),
        })
        .collect();

    HistoricalComparison {
        delta: group_stats.delta(&market_stats),
        group: group_stats,
        market: market_stats,
        distribution,
    }
}

pub fn compare_projection(pattern: &str, projections: &[Projection]) -> ProjectedComparison {
    let (group, market): (Vec<&Projection>, Vec<&Projection>) = projections
        .iter()
        .partition(|p| company_contains(p.company.as_deref(), pattern));

    let mut per_company: BTreeMap<String, Vec<&Projection>> = BTreeMap::new();
    for &p in &market {
        let company = p
            .company
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_COMPANY.to_string());
        per_company.entry(company).or_default().push(p);
    }
    let mut by_company: Vec<CompanyProjection> = per_company
        .into_iter()
        .map(|(company, funds)| CompanyProjection {
            company,
            stats: ProjectedStats::from_projections(&funds),
        })
        .collect();
    by_company.sort_by(|a, b| {
        b.stats
            .avg_score
            .partial_cmp(&a.stats.avg_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.company.cmp(&b.company))
    });

    ProjectedComparison {
        group: ProjectedStats::from_projections(&group),
        market: ProjectedStats::from_projections(&market),
        by_company,
    }
}

/// Full comparison plus filtered views of the group
pub fn peer_report(
    pattern: &str,
    summaries: &[FundRiskSummary],
    projections: &[Projection],
    recommendations: &[Recommendation],
) -> PeerReport {
    let in_group = |company: &Option<String>| company_contains(company.as_deref(), pattern);
    let report = PeerReport {
        pattern: pattern.to_string(),
        historical: compare_history(pattern, summaries),
        projected: compare_projection(pattern, projections),
        group_summaries: summaries.iter().filter(|s| in_group(&s.company)).cloned().collect(),
        group_projections: projections.iter().filter(|p| in_group(&p.company)).cloned().collect(),
        group_recommendations: recommendations.iter().filter(|r| in_group(&r.company)).cloned().collect(),
    };
    tracing::info!(
        "peer group '{}': {} of {} funds",
        pattern,
        report.group_summaries.len(),
        summaries.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn summary(code: &str, company: &str, score: f64, class: RiskLevel) -> FundRiskSummary {
        FundRiskSummary {
            code: code.to_string(),
            name: None,
            company: Some(company.to_string()),
            total_days: 10,
            high_days: 0,
            medium_days: 0,
            low_days: 10,
            normal_days: 0,
            risk_score: score,
            pct_high: score * 10.0,
            pct_medium_or_high: score * 20.0,
            last_level: class,
            final_class: class,
        }
    }

    fn projection(code: &str, company: Option<&str>, score: f64, class: RiskLevel) -> Projection {
        Projection {
            code: code.to_string(),
            name: None,
            company: company.map(str::to_string),
            last_predicted: class,
            avg_level: score,
            share_high: 0.0,
            share_medium_or_high: 0.0,
            predictions: 5,
            score,
            final_class: class,
            p_high_pct: 0.0,
            p_medium_or_high_pct: 0.0,
        }
    }

    #[test]
    fn test_history_group_vs_market() {
        let summaries = vec![
            summary("MA1", "Wafa Gestion", 1.0, RiskLevel::Low),
            summary("MA2", "WAFA GESTION", 2.0, RiskLevel::High),
            summary("MA3", "CDG CAPITAL", 0.5, RiskLevel::Low),
        ];
        let cmp = compare_history("wafa", &summaries);
        assert_eq!(cmp.group.funds, 2);
        assert_eq!(cmp.market.funds, 1);
        assert_relative_eq!(cmp.group.avg_risk_score.unwrap(), 1.5);
        assert_relative_eq!(cmp.delta.avg_risk_score.unwrap(), 1.0);
        assert_relative_eq!(cmp.group.pct_funds_high.unwrap(), 50.0);
        // one fund has no sample std
        assert!(cmp.market.std_risk_score.is_none());
        assert!(cmp.delta.std_risk_score.is_none());

        let low = cmp.distribution.iter().find(|d| d.level == RiskLevel::Low).unwrap();
        assert_relative_eq!(low.group_pct, 50.0);
        assert_relative_eq!(low.market_pct, 100.0);
    }

    #[test]
    fn test_projection_by_company_sorted() {
        let projections = vec![
            projection("MA1", Some("WAFA GESTION"), 2.5, RiskLevel::High),
            projection("MA2", Some("cdg capital"), 0.5, RiskLevel::Normal),
            projection("MA3", Some("BMCE CAPITAL"), 1.8, RiskLevel::Medium),
            projection("MA4", None, 1.0, RiskLevel::Low),
        ];
        let cmp = compare_projection("WAFA", &projections);
        assert_eq!(cmp.group.funds, 1);
        assert_eq!(cmp.market.funds, 3);
        let names: Vec<&str> = cmp.by_company.iter().map(|c| c.company.as_str()).collect();
        assert_eq!(names, vec!["BMCE CAPITAL", "UNKNOWN", "CDG CAPITAL"]);
        assert_relative_eq!(cmp.market.pct_funds_medium_or_high.unwrap(), 100.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_group() {
        let cmp = compare_history("NOBODY", &[summary("MA1", "CDG", 1.0, RiskLevel::Low)]);
        assert_eq!(cmp.group.funds, 0);
        assert!(cmp.group.avg_risk_score.is_none());
        assert!(cmp.group.pct_funds_high.is_none());
    }

    #[test]
    fn test_report_filters_group_views() {
        let summaries = vec![
            summary("MA1", "WAFA GESTION", 1.0, RiskLevel::Low),
            summary("MA2", "CDG", 1.0, RiskLevel::Low),
        ];
        let projections = vec![projection("MA1", Some("WAFA GESTION"), 1.0, RiskLevel::Low)];
        let report = peer_report("wafa", &summaries, &projections, &[]);
        assert_eq!(report.group_summaries.len(), 1);
        assert_eq!(report.group_projections.len(), 1);
        assert!(report.group_recommendations.is_empty());
    }
}
