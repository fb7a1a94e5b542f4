//! Range strategy configuration value object (spec §6 `range.*`, §4.4).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RangeConfigError {
    #[error("Invalid period: {field} = {value}. Must be > 0")]
    InvalidPeriod { field: String, value: usize },

    #[error("Invalid threshold: {field} = {value}. Must be positive")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid grid levels: min={min}, max={max}. min must be > 0 and <= max")]
    InvalidGridLevels { min: usize, max: usize },
}

/// Grid-trading parameters (spec §4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct RangeConfig {
    pub range_period: usize,
    pub grid_levels_min: usize,
    pub grid_levels_max: usize,
    pub grid_width_multiplier: f64,
    pub escape_threshold: f64,
    pub net_position_delta_max: f64,
}

impl RangeConfig {
    pub fn new(
        range_period: usize,
        grid_levels_min: usize,
        grid_levels_max: usize,
        grid_width_multiplier: f64,
        escape_threshold: f64,
        net_position_delta_max: f64,
    ) -> Result<Self, RangeConfigError> {
        let config = Self {
            range_period,
            grid_levels_min,
            grid_levels_max,
            grid_width_multiplier,
            escape_threshold,
            net_position_delta_max,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RangeConfigError> {
        if self.range_period == 0 {
            return Err(RangeConfigError::InvalidPeriod {
                field: "range_period".to_string(),
                value: self.range_period,
            });
        }
        if self.grid_levels_min == 0 || self.grid_levels_min > self.grid_levels_max {
            return Err(RangeConfigError::InvalidGridLevels {
                min: self.grid_levels_min,
                max: self.grid_levels_max,
            });
        }
        if self.grid_width_multiplier <= 0.0 {
            return Err(RangeConfigError::InvalidThreshold {
                field: "grid_width_multiplier".to_string(),
                value: self.grid_width_multiplier,
            });
        }
        if self.escape_threshold <= 0.0 {
            return Err(RangeConfigError::InvalidThreshold {
                field: "escape_threshold".to_string(),
                value: self.escape_threshold,
            });
        }
        if self.net_position_delta_max <= 0.0 {
            return Err(RangeConfigError::InvalidThreshold {
                field: "net_position_delta_max".to_string(),
                value: self.net_position_delta_max,
            });
        }
        Ok(())
    }
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            range_period: 30,
            grid_levels_min: 3,
            grid_levels_max: 10,
            grid_width_multiplier: 0.6,
            escape_threshold: 0.02,
            net_position_delta_max: 0.15,
        }
    }
}
