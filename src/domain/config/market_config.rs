//! Market/indicator configuration value object (spec §6 `market.*`).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MarketConfigError {
    #[error("Invalid period: {field} = {value}. Must be > 0")]
    InvalidPeriod { field: String, value: usize },

    #[error("Invalid threshold: {field} = {value}. Must be positive")]
    InvalidThreshold { field: String, value: f64 },
}

/// Indicator parameters shared across strategies (spec §4.1, §6).
///
/// # Invariants
///
/// - All period fields must be > 0
/// - `atr_percentage_threshold` and the slope-volatility thresholds must be >= 0.0
#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub short_term_ema: usize,
    pub long_term_ema: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub donchian_period: usize,
    pub atr_percentage_threshold: f64,
    pub slope_high_vol_threshold: f64,
    pub slope_low_vol_threshold: f64,
}

impl MarketConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        short_term_ema: usize,
        long_term_ema: usize,
        atr_period: usize,
        adx_period: usize,
        donchian_period: usize,
        atr_percentage_threshold: f64,
        slope_high_vol_threshold: f64,
        slope_low_vol_threshold: f64,
    ) -> Result<Self, MarketConfigError> {
        let config = Self {
            short_term_ema,
            long_term_ema,
            atr_period,
            adx_period,
            donchian_period,
            atr_percentage_threshold,
            slope_high_vol_threshold,
            slope_low_vol_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), MarketConfigError> {
        self.validate_period("short_term_ema", self.short_term_ema)?;
        self.validate_period("long_term_ema", self.long_term_ema)?;
        self.validate_period("atr_period", self.atr_period)?;
        self.validate_period("adx_period", self.adx_period)?;
        self.validate_period("donchian_period", self.donchian_period)?;
        self.validate_threshold("atr_percentage_threshold", self.atr_percentage_threshold)?;
        self.validate_threshold("slope_high_vol_threshold", self.slope_high_vol_threshold)?;
        self.validate_threshold("slope_low_vol_threshold", self.slope_low_vol_threshold)?;
        Ok(())
    }

    fn validate_period(&self, field: &str, value: usize) -> Result<(), MarketConfigError> {
        if value == 0 {
            return Err(MarketConfigError::InvalidPeriod {
                field: field.to_string(),
                value,
            });
        }
        Ok(())
    }

    fn validate_threshold(&self, field: &str, value: f64) -> Result<(), MarketConfigError> {
        if value < 0.0 {
            return Err(MarketConfigError::InvalidThreshold {
                field: field.to_string(),
                value,
            });
        }
        Ok(())
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            short_term_ema: 10,
            long_term_ema: 50,
            atr_period: 14,
            adx_period: 14,
            donchian_period: 20,
            atr_percentage_threshold: 6.0,
            slope_high_vol_threshold: 6.0,
            slope_low_vol_threshold: 2.0,
        }
    }
}
