//! Analysis configuration loaded from TOML.
//!
//! Every section is optional and falls back to its defaults:
//!
//! ```toml
//! [pricing]
//! rate = 0.045
//!
//! [regime]
//! vix_symbol = "^VIX"
//!
//! [diagnosis]
//! realized_vol_window = 10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnosis::DiagnosisConfig;
use crate::pricing::PricingConfig;
use crate::regime::RegimeAnalyzerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Configuration for one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub pricing: PricingConfig,
    pub regime: RegimeAnalyzerConfig,
    pub diagnosis: DiagnosisConfig,
}

impl AnalysisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pricing;
        if !(p.vol_lower > 0.0 && p.vol_lower < p.vol_upper) {
            return Err(ConfigError::Invalid(format!(
                "volatility bounds [{}, {}]",
                p.vol_lower, p.vol_upper
            )));
        }
        if p.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be positive".into()));
        }

        let r = &self.regime;
        if !(r.vix_low <= r.vix_normal && r.vix_normal <= r.vix_elevated) {
            return Err(ConfigError::Invalid(format!(
                "VIX thresholds {}/{}/{} must ascend",
                r.vix_low, r.vix_normal, r.vix_elevated
            )));
        }
        if r.spy_lookback_min_days > r.spy_lookback_max_days {
            return Err(ConfigError::Invalid("SPY lookback window is empty".into()));
        }

        if self.diagnosis.realized_vol_window < 2 {
            return Err(ConfigError::Invalid(
                "realized_vol_window must be at least 2".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config.pricing.rate, 0.05);
        assert_eq!(config.pricing.max_iterations, 100);
        assert_eq!(config.regime.vix_symbol, "VIX");
        assert_eq!(config.regime.vix_elevated, 25.0);
        assert_eq!(config.diagnosis.realized_vol_window, 20);
    }

    #[test]
    fn test_partial_sections() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            [pricing]
            rate = 0.04

            [regime]
            spy_symbol = "SPX"
            "#,
        )
        .unwrap();

        assert_eq!(config.pricing.rate, 0.04);
        assert_eq!(config.pricing.vol_upper, 5.0);
        assert_eq!(config.regime.spy_symbol, "SPX");
        assert_eq!(config.regime.vix_symbol, "VIX");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            AnalysisConfig::from_toml_str("[pricing]\nvol_lower = 6.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml_str("[regime]\nvix_low = 30.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml_str("[pricing]\nrate = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
