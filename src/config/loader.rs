//! Configuration Loader
//!
//! Loads and validates the pipeline configuration from a TOML file. Every
//! section is optional; missing keys fall back to the production defaults.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::strategy::params::{
    AggregationParams, FeatureParams, FusionParams, OutlierParams, PipelineParams, PredictorParams,
    ProjectionParams, RecommendationParams, RuleParams,
};

pub const INPUT_DIR_ENV: &str = "FUNDWATCH_INPUT_DIR";
pub const OUTPUT_DIR_ENV: &str = "FUNDWATCH_OUTPUT_DIR";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure matching fundwatch.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub features: FeatureParams,
    pub rules: RuleParams,
    pub outlier: OutlierParams,
    pub fusion: FusionParams,
    pub risk: AggregationParams,
    pub predictor: PredictorParams,
    pub projection: ProjectionParams,
    pub recommendation: RecommendationParams,
    pub peer: PeerSection,
    pub data: DataSection,
    pub logging: LoggingSection,
}

/// Peer-group comparison section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeerSection {
    /// Case-insensitive company substring, e.g. "WAFA"; no report when unset
    pub company_pattern: Option<String>,
}

/// Input/output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Directory holding `daily.json` and `weekly.json`
    pub input_dir: String,
    /// Directory receiving the output tables
    pub output_dir: String,
    /// Regex every instrument code must match, e.g. `^MA[0-9A-Z]+$`
    pub code_pattern: Option<String>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            input_dir: "data/input".to_string(),
            output_dir: "data/output".to_string(),
            code_pattern: None,
        }
    }
}

impl DataSection {
    /// Input directory with environment variable override
    /// Checks FUNDWATCH_INPUT_DIR first, falls back to config value
    pub fn get_input_dir(&self) -> String {
        std::env::var(INPUT_DIR_ENV).unwrap_or_else(|_| self.input_dir.clone())
    }

    /// Output directory with environment variable override
    /// Checks FUNDWATCH_OUTPUT_DIR first, falls back to config value
    pub fn get_output_dir(&self) -> String {
        std::env::var(OUTPUT_DIR_ENV).unwrap_or_else(|_| self.output_dir.clone())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        PipelineParams::from(self)
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.data.input_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "input_dir cannot be empty".to_string(),
            ));
        }

        if self.data.output_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "output_dir cannot be empty".to_string(),
            ));
        }

        if let Some(ref pattern) = self.data.code_pattern {
            regex::Regex::new(pattern).map_err(|e| {
                ConfigError::ValidationError(format!("code_pattern '{}' is invalid: {}", pattern, e))
            })?;
        }

        if let Some(ref pattern) = self.peer.company_pattern {
            if pattern.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "company_pattern cannot be empty when set".to_string(),
                ));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.logging.level
            )));
        }

        Ok(())
    }
}

// Conversion from Config to PipelineParams
impl From<&Config> for PipelineParams {
    fn from(config: &Config) -> Self {
        PipelineParams {
            features: config.features.clone(),
            rules: config.rules.clone(),
            outlier: config.outlier.clone(),
            fusion: config.fusion.clone(),
            aggregation: config.risk.clone(),
            predictor: config.predictor.clone(),
            projection: config.projection.clone(),
            recommendation: config.recommendation.clone(),
            peer_group: config.peer.company_pattern.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[features]
daily_window = 20
weekly_window = 12

[rules]
z_threshold = 3.0
volatility_quantile = 0.99
daily_drawdown = -0.10
weekly_drawdown = -0.15

[outlier]
contamination = 0.02
daily_trees = 200
weekly_trees = 300
fallback_rule_threshold = 2

[fusion]
weekly_weight = 2
daily_weight = 1

[risk]
high_pct_threshold = 10.0
medium_or_high_pct_threshold = 20.0

[risk.points]
normal = 0.0
low = 1.0
medium = 2.0
high = 3.0

[predictor]
cutoff = "2024-12-31"
trees = 300
max_depth = 8

[projection]
lookback = 30

[peer]
company_pattern = "WAFA"

[data]
input_dir = "data/input"
output_dir = "data/output"
code_pattern = "^MA[0-9A-Z]+$"

[logging]
level = "info"
"#
        .to_string()
    }

    fn load_str(content: &str) -> Result<Config, ConfigError> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        load_config(file.path())
    }

    #[test]
    fn test_load_valid_config() {
        let config = load_str(&create_valid_config()).unwrap();

        assert_eq!(config.features.daily_window, 20);
        assert_eq!(config.outlier.fallback_rule_threshold, Some(2));
        assert_eq!(config.risk.points.high, 3.0);
        assert_eq!(config.projection.lookback, Some(30));
        assert_eq!(config.peer.company_pattern.as_deref(), Some("WAFA"));
        assert_eq!(config.data.code_pattern.as_deref(), Some("^MA[0-9A-Z]+$"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_str("").unwrap();
        assert_eq!(config.outlier.contamination, 0.02);
        assert_eq!(config.fusion.weekly_weight, 2);
        assert_eq!(config.data.output_dir, "data/output");
        assert_eq!(config.logging.level, "info");
        assert!(config.peer.company_pattern.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let result = load_str("[outlier\ncontamination = ");
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_contamination() {
        let result = load_str("[outlier]\ncontamination = 0.9\n");
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_risk_points() {
        let result = load_str("[risk.points]\nlow = 5.0\nmedium = 2.0\n");
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_code_pattern() {
        let result = load_str("[data]\ncode_pattern = \"([\"\n");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("code_pattern"));
    }

    #[test]
    fn test_invalid_log_level() {
        let result = load_str("[logging]\nlevel = \"loud\"\n");
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_config_to_pipeline_params() {
        let config = load_str(&create_valid_config()).unwrap();
        let params = PipelineParams::from(&config);

        assert_eq!(params.features.weekly_window, 12);
        assert_eq!(params.rules.z_threshold, 3.0);
        assert_eq!(params.aggregation.high_pct_threshold, 10.0);
        assert_eq!(
            params.predictor.cutoff,
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
        assert_eq!(params.peer_group.as_deref(), Some("WAFA"));
    }
}
