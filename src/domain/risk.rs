use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskLevelError {
    #[error("Unknown risk level label: {0}")]
    UnknownLabel(String),

    #[error("Risk ordinal out of range: {0} (expected 0-3)")]
    OrdinalOutOfRange(u8),
}

/// Ordinal risk taxonomy. Declaration order is the risk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "LOW_RISK")]
    Low,
    #[serde(rename = "MEDIUM_RISK")]
    Medium,
    #[serde(rename = "HIGH_RISK")]
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Normal,
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            RiskLevel::Normal => 0,
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Result<Self, RiskLevelError> {
        match ordinal {
            0 => Ok(RiskLevel::Normal),
            1 => Ok(RiskLevel::Low),
            2 => Ok(RiskLevel::Medium),
            3 => Ok(RiskLevel::High),
            other => Err(RiskLevelError::OrdinalOutOfRange(other)),
        }
    }

    /// Map a combined anomaly score to a level; scores above 3 saturate at HIGH
    pub fn from_combined_score(score: u8) -> Self {
        match score {
            0 => RiskLevel::Normal,
            1 => RiskLevel::Low,
            2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Normal => "NORMAL",
            RiskLevel::Low => "LOW_RISK",
            RiskLevel::Medium => "MEDIUM_RISK",
            RiskLevel::High => "HIGH_RISK",
        }
    }

    /// NORMAL or LOW_RISK
    pub fn is_stable(self) -> bool {
        self <= RiskLevel::Low
    }

    pub fn is_medium_or_higher(self) -> bool {
        self >= RiskLevel::Medium
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RiskLevel {
    type Err = RiskLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Ok(RiskLevel::Normal),
            "LOW_RISK" => Ok(RiskLevel::Low),
            "MEDIUM_RISK" => Ok(RiskLevel::Medium),
            "HIGH_RISK" => Ok(RiskLevel::High),
            _ => Err(RiskLevelError::UnknownLabel(s.to_string())),
        }
    }
}

/// Points assigned to each level when averaging a risk history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPoints {
    pub normal: f64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskPoints {
    fn default() -> Self {
        Self {
            normal: 0.0,
            low: 1.0,
            medium: 2.0,
            high: 3.0,
        }
    }
}

impl RiskPoints {
    pub fn points(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Normal => self.normal,
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
        }
    }

    /// Points must be finite and non-decreasing with the level order
    pub fn is_monotonic(&self) -> bool {
        let p = [self.normal, self.low, self.medium, self.high];
        p.iter().all(|v| v.is_finite()) && p.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Fused daily risk observation for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub code: String,
    pub date: NaiveDate,
    pub daily_flag: u8,
    pub weekly_flag: u8,
    /// Date of the weekly record matched as-of, if any
    pub weekly_date: Option<NaiveDate>,
    pub combined_score: u8,
    pub level: RiskLevel,
}

/// Per-instrument aggregate of a full risk history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundRiskSummary {
    pub code: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub total_days: usize,
    pub high_days: usize,
    pub medium_days: usize,
    pub low_days: usize,
    pub normal_days: usize,
    /// Mean level points over the history
    pub risk_score: f64,
    pub pct_high: f64,
    pub pct_medium_or_high: f64,
    pub last_level: RiskLevel,
    pub final_class: RiskLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_roundtrip_and_order() {
        for level in RiskLevel::ALL {
            assert_eq!(RiskLevel::from_ordinal(level.ordinal()).unwrap(), level);
        }
        assert!(RiskLevel::Normal < RiskLevel::Low);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::from_ordinal(4).is_err());
    }

    #[test]
    fn test_combined_score_mapping_is_monotonic() {
        let levels: Vec<RiskLevel> = (0..=5).map(RiskLevel::from_combined_score).collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(levels[3], RiskLevel::High);
        assert_eq!(levels[5], RiskLevel::High);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("high_risk".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!(" NORMAL ".parse::<RiskLevel>().unwrap(), RiskLevel::Normal);
        assert!("CRITICAL".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&RiskLevel::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM_RISK\"");
        let back: RiskLevel = serde_json::from_str("\"LOW_RISK\"").unwrap();
        assert_eq!(back, RiskLevel::Low);
    }

    #[test]
    fn test_stability_helpers() {
        assert!(RiskLevel::Normal.is_stable());
        assert!(RiskLevel::Low.is_stable());
        assert!(!RiskLevel::Medium.is_stable());
        assert!(RiskLevel::Medium.is_medium_or_higher());
        assert!(!RiskLevel::Low.is_medium_or_higher());
    }

    #[test]
    fn test_risk_points() {
        let points = RiskPoints::default();
        assert_eq!(points.points(RiskLevel::High), 3.0);
        assert!(points.is_monotonic());

        let broken = RiskPoints { low: 5.0, ..points };
        assert!(!broken.is_monotonic());
    }
}
