//! Trend strategy configuration value object (spec §6 `trend.*`, §4.3).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TrendConfigError {
    #[error("Invalid period: {field} = {value}. Must be > 0")]
    InvalidPeriod { field: String, value: usize },

    #[error("Invalid threshold: {field} = {value}. Must be positive")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid pyramid limit: {field} = {value}. Must be > 0")]
    InvalidPyramidLimit { field: String, value: usize },
}

/// Donchian breakout / pyramiding parameters (spec §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct TrendConfig {
    pub donchian_period: usize,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub atr_trailing_stop_multiplier: f64,
    pub add_on_position_multiplier: f64,
    pub max_pyramids: usize,
}

impl TrendConfig {
    pub fn new(
        donchian_period: usize,
        adx_period: usize,
        adx_threshold: f64,
        atr_trailing_stop_multiplier: f64,
        add_on_position_multiplier: f64,
        max_pyramids: usize,
    ) -> Result<Self, TrendConfigError> {
        let config = Self {
            donchian_period,
            adx_period,
            adx_threshold,
            atr_trailing_stop_multiplier,
            add_on_position_multiplier,
            max_pyramids,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), TrendConfigError> {
        if self.donchian_period == 0 {
            return Err(TrendConfigError::InvalidPeriod {
                field: "donchian_period".to_string(),
                value: self.donchian_period,
            });
        }
        if self.adx_period == 0 {
            return Err(TrendConfigError::InvalidPeriod {
                field: "adx_period".to_string(),
                value: self.adx_period,
            });
        }
        if self.adx_threshold < 0.0 {
            return Err(TrendConfigError::InvalidThreshold {
                field: "adx_threshold".to_string(),
                value: self.adx_threshold,
            });
        }
        if self.atr_trailing_stop_multiplier <= 0.0 {
            return Err(TrendConfigError::InvalidThreshold {
                field: "atr_trailing_stop_multiplier".to_string(),
                value: self.atr_trailing_stop_multiplier,
            });
        }
        if self.add_on_position_multiplier <= 0.0 {
            return Err(TrendConfigError::InvalidThreshold {
                field: "add_on_position_multiplier".to_string(),
                value: self.add_on_position_multiplier,
            });
        }
        if self.max_pyramids == 0 {
            return Err(TrendConfigError::InvalidPyramidLimit {
                field: "max_pyramids".to_string(),
                value: self.max_pyramids,
            });
        }
        Ok(())
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            donchian_period: 20,
            adx_period: 14,
            adx_threshold: 25.0,
            atr_trailing_stop_multiplier: 1.2,
            add_on_position_multiplier: 0.5,
            max_pyramids: 2,
        }
    }
}
