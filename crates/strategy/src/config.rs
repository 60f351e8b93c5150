use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Decision-engine parameters (TOML). Every field is optional; missing
/// fields take the defaults below.
///
/// Example `config/signal.toml`:
/// ```toml
/// window = 20
/// zscore_threshold = 1.5
/// min_correlation = 0.2
/// max_gap_days = 5
///
/// risk_indicator = "vix"
/// risk_ceiling = 25.0
///
/// primary_key = "iron_ore"
/// equity_key = "vale3"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalConfig {
    /// Daily returns in the historical volatility / correlation window.
    pub window: usize,
    /// |z| the current return must exceed to produce a trade.
    pub zscore_threshold: f64,
    /// Minimum return correlation between the primary and secondary series.
    pub min_correlation: f64,
    /// Longest forward fill when aligning calendars, in calendar days.
    pub max_gap_days: u32,
    /// Auxiliary key of the market fear gauge.
    pub risk_indicator: String,
    /// Above this the market is too nervous to trade.
    pub risk_ceiling: f64,
    /// Auxiliary key of the secondary market variation (a fraction).
    pub secondary_indicator: String,
    /// Largest |variation| of the secondary indicator still considered calm.
    pub secondary_ceiling: f64,
    /// |z| mapping to full confidence.
    pub confidence_scale: f64,
    /// Intraday look-back used by the direction-consistency check.
    pub direction_lookback_hours: u32,
    /// Snapshot key of the leading instrument.
    pub primary_key: String,
    /// Snapshot key of the traded equity; its calendar is the reference.
    pub equity_key: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window: 20,
            zscore_threshold: 1.5,
            min_correlation: 0.2,
            max_gap_days: 5,
            risk_indicator: "vix".into(),
            risk_ceiling: 25.0,
            secondary_indicator: "usd_brl_change".into(),
            secondary_ceiling: 0.005,
            confidence_scale: 3.0,
            direction_lookback_hours: 2,
            primary_key: "iron_ore".into(),
            equity_key: "vale3".into(),
        }
    }
}

impl SignalConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read signal config at '{path}': {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window < 2 {
            return Err(Error::config("window must be at least 2"));
        }
        for (name, value) in [
            ("zscore_threshold", self.zscore_threshold),
            ("risk_ceiling", self.risk_ceiling),
            ("secondary_ceiling", self.secondary_ceiling),
            ("confidence_scale", self.confidence_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::config(format!("{name} must be positive, got {value}")));
            }
        }
        if !(-1.0..=1.0).contains(&self.min_correlation) {
            return Err(Error::config(format!(
                "min_correlation must be within [-1, 1], got {}",
                self.min_correlation
            )));
        }
        if self.direction_lookback_hours == 0 {
            return Err(Error::config("direction_lookback_hours must be positive"));
        }
        if self.primary_key.is_empty() || self.equity_key.is_empty() {
            return Err(Error::config("primary_key and equity_key must be set"));
        }
        if self.primary_key == self.equity_key {
            return Err(Error::config("primary_key and equity_key must differ"));
        }
        Ok(())
    }
}
