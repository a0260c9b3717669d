//! Forward-looking entities: next-period predictions, 30-day projections
//! and the recommendations derived from them.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::risk::RiskLevel;

/// Predicted next-period level for one test row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub code: String,
    pub date: NaiveDate,
    /// Level actually observed at the next period
    pub actual_next: RiskLevel,
    pub predicted_next: RiskLevel,
}

/// Forward risk outlook for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub code: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub last_predicted: RiskLevel,
    /// Mean predicted ordinal
    pub avg_level: f64,
    /// Share of predictions equal to HIGH_RISK (0-1)
    pub share_high: f64,
    /// Share of predictions at MEDIUM_RISK or above (0-1)
    pub share_medium_or_high: f64,
    pub predictions: usize,
    pub score: f64,
    pub final_class: RiskLevel,
    /// `share_high` in percent
    pub p_high_pct: f64,
    /// `share_medium_or_high` in percent
    pub p_medium_or_high_pct: f64,
}

/// Recommended action category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Reinforce,
    Monitor,
    ReduceExposure,
    ReviewStrategy,
    ImprovingKeepWatch,
    Watchlist,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Reinforce => "REINFORCE",
            Action::Monitor => "MONITOR",
            Action::ReduceExposure => "REDUCE_EXPOSURE",
            Action::ReviewStrategy => "REVIEW_STRATEGY",
            Action::ImprovingKeepWatch => "IMPROVING_KEEP_WATCH",
            Action::Watchlist => "WATCHLIST",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub code: String,
    pub name: Option<String>,
    pub company: Option<String>,
    /// Historical final class; `None` when the instrument has no summary
    pub current_class: Option<RiskLevel>,
    pub current_score: Option<f64>,
    pub pct_high: Option<f64>,
    pub pct_medium_or_high: Option<f64>,
    pub projected_class: RiskLevel,
    pub projected_score: f64,
    pub p_high_pct: f64,
    pub p_medium_or_high_pct: f64,
    pub predictions: usize,
    pub action: Action,
    pub priority: f64,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_labels_match_serde() {
        for action in [
            Action::Reinforce,
            Action::Monitor,
            Action::ReduceExposure,
            Action::ReviewStrategy,
            Action::ImprovingKeepWatch,
            Action::Watchlist,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.label()));
        }
    }
}
