//! Risk management configuration value object (spec §6 `risk.*`, §4.6/§4.7).

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RiskConfigError {
    #[error("Invalid percentage: {field} = {value}. Must be between 0.0 and 1.0")]
    InvalidPercentage { field: String, value: f64 },

    #[error("Invalid threshold: {field} = {value}. Must be positive")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid hours: {field} = {value}. Must be > 0")]
    InvalidHours { field: String, value: u32 },
}

/// Risk-filter and emergency-regime parameters (spec §4.6, §4.7, §4.2 rule 1).
///
/// # Invariants
///
/// - `max_risk_per_trade`, `max_daily_loss`, `max_position_size` are in range (0.0, 1.0]
/// - all ATR/stop-distance thresholds are > 0.0
/// - `emergency_recovery_hours` is > 0
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub max_risk_per_trade: f64,
    pub max_daily_loss: f64,
    pub max_position_size: f64,
    pub allow_shrink: bool,
    pub emergency_gap_threshold: f64,
    pub emergency_recovery_threshold: f64,
    pub emergency_recovery_hours: u32,
    pub default_atr_pct: f64,
    pub min_stop_distance_pct: f64,
    pub min_atr_value: f64,
}

impl RiskConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_risk_per_trade: f64,
        max_daily_loss: f64,
        max_position_size: f64,
        allow_shrink: bool,
        emergency_gap_threshold: f64,
        emergency_recovery_threshold: f64,
        emergency_recovery_hours: u32,
        default_atr_pct: f64,
        min_stop_distance_pct: f64,
        min_atr_value: f64,
    ) -> Result<Self, RiskConfigError> {
        let config = Self {
            max_risk_per_trade,
            max_daily_loss,
            max_position_size,
            allow_shrink,
            emergency_gap_threshold,
            emergency_recovery_threshold,
            emergency_recovery_hours,
            default_atr_pct,
            min_stop_distance_pct,
            min_atr_value,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RiskConfigError> {
        self.validate_percentage("max_risk_per_trade", self.max_risk_per_trade)?;
        self.validate_percentage("max_daily_loss", self.max_daily_loss)?;
        self.validate_percentage("max_position_size", self.max_position_size)?;
        self.validate_threshold("emergency_gap_threshold", self.emergency_gap_threshold)?;
        self.validate_threshold(
            "emergency_recovery_threshold",
            self.emergency_recovery_threshold,
        )?;
        self.validate_threshold("default_atr_pct", self.default_atr_pct)?;
        self.validate_threshold("min_stop_distance_pct", self.min_stop_distance_pct)?;
        self.validate_threshold("min_atr_value", self.min_atr_value)?;
        if self.emergency_recovery_hours == 0 {
            return Err(RiskConfigError::InvalidHours {
                field: "emergency_recovery_hours".to_string(),
                value: self.emergency_recovery_hours,
            });
        }
        Ok(())
    }

    fn validate_percentage(&self, field: &str, value: f64) -> Result<(), RiskConfigError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(RiskConfigError::InvalidPercentage {
                field: field.to_string(),
                value,
            });
        }
        Ok(())
    }

    fn validate_threshold(&self, field: &str, value: f64) -> Result<(), RiskConfigError> {
        if value <= 0.0 {
            return Err(RiskConfigError::InvalidThreshold {
                field: field.to_string(),
                value,
            });
        }
        Ok(())
    }

    pub fn max_risk_per_trade_decimal(&self) -> Decimal {
        Decimal::try_from(self.max_risk_per_trade).unwrap_or(Decimal::ZERO)
    }

    pub fn max_daily_loss_decimal(&self) -> Decimal {
        Decimal::try_from(self.max_daily_loss).unwrap_or(Decimal::ZERO)
    }

    pub fn max_position_size_decimal(&self) -> Decimal {
        Decimal::try_from(self.max_position_size).unwrap_or(Decimal::ZERO)
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: 0.01,
            max_daily_loss: 0.05,
            max_position_size: 0.35,
            allow_shrink: false,
            emergency_gap_threshold: 0.15,
            emergency_recovery_threshold: 0.075,
            emergency_recovery_hours: 24,
            default_atr_pct: 0.02,
            min_stop_distance_pct: 0.01,
            min_atr_value: 0.0001,
        }
    }
}
