//! RegimeClassifier (spec §4.2): labels the current market from
//! `IndicatorState` features.

use crate::domain::market::indicators::IndicatorState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    StrongUp,
    Up,
    WeakUp,
    Range,
    WeakDown,
    Down,
    StrongDown,
    Unknown,
}

/// The feature vector that produced a `Regime` (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeFeatures {
    pub ema_slope_deg: f64,
    pub atr_pct: f64,
    pub adx: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RegimeSnapshot {
    pub regime: Regime,
    pub features: RegimeFeatures,
}

pub struct RegimeClassifierConfig {
    pub atr_percentage_threshold: f64,
    pub slope_threshold_deg: f64,
    pub adx_strong_threshold: f64,
    pub adx_trend_threshold: f64,
}

impl Default for RegimeClassifierConfig {
    fn default() -> Self {
        Self {
            atr_percentage_threshold: 6.0,
            slope_threshold_deg: 5.0,
            adx_strong_threshold: 35.0,
            adx_trend_threshold: 25.0,
        }
    }
}

pub struct RegimeClassifier {
    config: RegimeClassifierConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeClassifierConfig) -> Self {
        Self { config }
    }

    /// Evaluates spec §4.2 rules 2-4 in order (rule 1, the black-swan
    /// sentinel, is handled separately by the dispatcher against the raw
    /// daily move, not through this classifier).
    pub fn classify(&self, indicators: &mut IndicatorState) -> RegimeSnapshot {
        if !indicators.has_warmed_up() {
            return RegimeSnapshot {
                regime: Regime::Unknown,
                features: RegimeFeatures {
                    ema_slope_deg: 0.0,
                    atr_pct: 0.0,
                    adx: 0.0,
                },
            };
        }

        let atr_pct = indicators.atr_pct().unwrap_or(0.0);
        let adx = indicators.adx().unwrap_or(0.0);
        let ema_slope_deg = indicators.ema_slope_degrees().unwrap_or(0.0);
        let features = RegimeFeatures {
            ema_slope_deg,
            atr_pct,
            adx,
        };

        if atr_pct < self.config.atr_percentage_threshold
            && ema_slope_deg.abs() < self.config.slope_threshold_deg
        {
            return RegimeSnapshot {
                regime: Regime::Range,
                features,
            };
        }

        let magnitude = if adx >= self.config.adx_strong_threshold {
            Magnitude::Strong
        } else if adx >= self.config.adx_trend_threshold {
            Magnitude::Normal
        } else {
            Magnitude::Weak
        };

        let regime = if ema_slope_deg >= 0.0 {
            match magnitude {
                Magnitude::Strong => Regime::StrongUp,
                Magnitude::Normal => Regime::Up,
                Magnitude::Weak => Regime::WeakUp,
            }
        } else {
            match magnitude {
                Magnitude::Strong => Regime::StrongDown,
                Magnitude::Normal => Regime::Down,
                Magnitude::Weak => Regime::WeakDown,
            }
        };

        RegimeSnapshot { regime, features }
    }
}

enum Magnitude {
    Strong,
    Normal,
    Weak,
}

/// Absolute size of the move from the previous day's close to `current_close`,
/// as a fraction (0.15 == 15%). The dispatcher feeds this into both the
/// black-swan gate and the recovery-window check (spec §4.2 rule 1, §4.3),
/// so it lives here once rather than being recomputed at each call site.
pub fn daily_move_pct(previous_daily_close: f64, current_close: f64) -> f64 {
    if previous_daily_close == 0.0 {
        return 0.0;
    }
    ((current_close - previous_daily_close) / previous_daily_close).abs()
}

/// Black-swan sentinel (spec §4.2 rule 1): a 24h price move beyond
/// `black_swan_threshold` forces EMERGENCY regardless of regime. This is
/// evaluated by the dispatcher, not folded into `Regime`, per spec §4.2.
pub struct BlackSwanDetector {
    pub threshold_pct: f64,
}

impl BlackSwanDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    /// `previous_daily_close` and `current_close` are both in price units.
    pub fn check(&self, previous_daily_close: f64, current_close: f64) -> bool {
        daily_move_pct(previous_daily_close, current_close) >= self.threshold_pct
    }
}
