//! StrategyDispatcher (spec §4.3): the process-wide `SystemMode` state
//! machine and the mode x regime -> strategy selection table.

use crate::domain::market::regime::Regime;
use crate::domain::trading::types::SystemMode;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// `risk.emergency_gap_threshold` (default 0.15): a 24h move at or
    /// above this forces EMERGENCY (spec §4.2 rule 1).
    pub black_swan_threshold: f64,
    /// `risk.emergency_recovery_threshold` (default 0.075, i.e.
    /// `black_swan_threshold / 2`): recovery requires moves to stay below
    /// this for a contiguous window (spec §4.3, §9 decision (c)).
    pub recovery_threshold: f64,
    /// `risk.emergency_recovery_hours` (default 24).
    pub recovery_hours: u32,
    /// `risk.max_daily_loss` (default 0.05).
    pub max_daily_loss: f64,
}

/// Which strategy the dispatcher selected for this tick (spec §4.3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedStrategy {
    Trend,
    /// NORMAL + {WEAK_UP, WEAK_DOWN}: Trend with a reduced size factor.
    TrendReduced,
    Range,
    Emergency,
    /// KILL_SWITCH/STANDBY (no new entries) or UNKNOWN regime: no strategy
    /// runs this tick; existing orders may still be cancelled by the
    /// engine directly.
    None,
}

/// Owns the `SystemMode` latch and its transition table (spec §4.3). This
/// is the synchronous core; `application::system` wraps it with the
/// mode-transition mpsc channel required by spec §5 so writes are
/// serialised and broadcast to readers.
pub struct StrategyDispatcher {
    mode: SystemMode,
    config: DispatcherConfig,
    /// Start of the current contiguous calm window while in EMERGENCY;
    /// reset whenever a tick's move exceeds `recovery_threshold`.
    calm_since_ms: Option<i64>,
    /// UTC day index STANDBY was entered on, to detect "next UTC midnight".
    standby_since_day: Option<i64>,
}

impl StrategyDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            mode: SystemMode::Normal,
            config,
            calm_since_ms: None,
            standby_since_day: None,
        }
    }

    pub fn mode(&self) -> SystemMode {
        self.mode
    }

    /// Evaluates the spec §4.3 transition table for one tick.
    ///
    /// `daily_move_pct` is the absolute 24h price move fraction (spec §4.2
    /// rule 1 / §4.3's black-swan and recovery checks); `day_index` is a
    /// UTC day counter (`floor(tick_utc_day)`) used for the STANDBY ->
    /// NORMAL midnight rule; `daily_pnl_pct` is `daily_pnl / midnight_balance`.
    pub fn on_tick(&mut self, daily_move_pct: f64, tick_t_ms: i64, day_index: i64, daily_pnl_pct: f64) {
        match self.mode {
            SystemMode::Normal | SystemMode::RiskReduction => {
                if daily_move_pct.abs() >= self.config.black_swan_threshold {
                    self.mode = SystemMode::Emergency;
                    self.calm_since_ms = Some(tick_t_ms);
                } else if daily_pnl_pct <= -self.config.max_daily_loss {
                    self.mode = SystemMode::Standby;
                    self.standby_since_day = Some(day_index);
                }
            }
            SystemMode::Emergency => {
                if daily_move_pct.abs() >= self.config.recovery_threshold {
                    self.calm_since_ms = Some(tick_t_ms);
                    return;
                }
                let calm_start = *self.calm_since_ms.get_or_insert(tick_t_ms);
                let elapsed_hours = (tick_t_ms - calm_start) as f64 / 3_600_000.0;
                if elapsed_hours >= self.config.recovery_hours as f64 {
                    self.mode = SystemMode::Normal;
                    self.calm_since_ms = None;
                }
            }
            SystemMode::Standby => {
                if let Some(since_day) = self.standby_since_day {
                    if day_index > since_day {
                        self.mode = SystemMode::Normal;
                        self.standby_since_day = None;
                    }
                }
            }
            SystemMode::KillSwitch => {}
        }
    }

    /// Terminal transition reachable from any state (spec §4.3: "any ->
    /// kill switch invoked -> KILL_SWITCH (terminal)").
    pub fn trigger_kill_switch(&mut self) {
        self.mode = SystemMode::KillSwitch;
    }

    /// Selects the active strategy for mode x regime (spec §4.3 table).
    pub fn select(&self, regime: Regime) -> SelectedStrategy {
        if self.mode.is_terminal() || self.mode == SystemMode::Standby {
            return SelectedStrategy::None;
        }
        if self.mode == SystemMode::Emergency {
            return SelectedStrategy::Emergency;
        }
        match regime {
            Regime::StrongUp | Regime::Up | Regime::StrongDown | Regime::Down => {
                SelectedStrategy::Trend
            }
            Regime::WeakUp | Regime::WeakDown => SelectedStrategy::TrendReduced,
            Regime::Range => SelectedStrategy::Range,
            Regime::Unknown => SelectedStrategy::None,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            black_swan_threshold: 0.15,
            recovery_threshold: 0.075,
            recovery_hours: 24,
            max_daily_loss: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    #[test]
    fn black_swan_move_forces_emergency() {
        let mut d = StrategyDispatcher::new(DispatcherConfig::default());
        d.on_tick(0.16, 0, 19000, 0.0);
        assert_eq!(d.mode(), SystemMode::Emergency);
        assert_eq!(d.select(Regime::StrongUp), SelectedStrategy::Emergency);
    }

    #[test]
    fn emergency_recovers_after_24h_of_calm() {
        let mut d = StrategyDispatcher::new(DispatcherConfig::default());
        d.on_tick(0.16, 0, 19000, 0.0);
        assert_eq!(d.mode(), SystemMode::Emergency);

        // 23 calm hours: still emergency.
        for h in 1..=23 {
            d.on_tick(0.01, h * HOUR_MS, 19000, 0.0);
        }
        assert_eq!(d.mode(), SystemMode::Emergency);

        // One more calm hour crosses the 24h contiguous window.
        d.on_tick(0.01, 24 * HOUR_MS, 19000, 0.0);
        assert_eq!(d.mode(), SystemMode::Normal);
    }

    #[test]
    fn a_renewed_shock_resets_the_calm_window() {
        let mut d = StrategyDispatcher::new(DispatcherConfig::default());
        d.on_tick(0.16, 0, 19000, 0.0);
        for h in 1..=20 {
            d.on_tick(0.01, h * HOUR_MS, 19000, 0.0);
        }
        // Shock at hour 21 resets the clock.
        d.on_tick(0.08, 21 * HOUR_MS, 19000, 0.0);
        for h in 22..=44 {
            d.on_tick(0.01, h * HOUR_MS, 19000, 0.0);
        }
        assert_eq!(d.mode(), SystemMode::Emergency); // only 23 calm hours since the reset
        d.on_tick(0.01, 45 * HOUR_MS, 19000, 0.0);
        assert_eq!(d.mode(), SystemMode::Normal);
    }

    #[test]
    fn daily_loss_enters_standby_and_clears_at_midnight() {
        let mut d = StrategyDispatcher::new(DispatcherConfig::default());
        d.on_tick(0.0, 0, 19000, -0.06);
        assert_eq!(d.mode(), SystemMode::Standby);
        assert_eq!(d.select(Regime::Up), SelectedStrategy::None);

        d.on_tick(0.0, HOUR_MS, 19000, -0.06); // still same day
        assert_eq!(d.mode(), SystemMode::Standby);

        d.on_tick(0.0, 25 * HOUR_MS, 19001, 0.0); // next UTC day
        assert_eq!(d.mode(), SystemMode::Normal);
    }

    #[test]
    fn kill_switch_is_terminal() {
        let mut d = StrategyDispatcher::new(DispatcherConfig::default());
        d.trigger_kill_switch();
        d.on_tick(0.0, 0, 19000, 0.0);
        assert_eq!(d.mode(), SystemMode::KillSwitch);
        assert_eq!(d.select(Regime::Up), SelectedStrategy::None);
    }

    #[test]
    fn weak_regimes_select_reduced_trend() {
        let d = StrategyDispatcher::new(DispatcherConfig::default());
        assert_eq!(d.select(Regime::WeakUp), SelectedStrategy::TrendReduced);
        assert_eq!(d.select(Regime::Range), SelectedStrategy::Range);
        assert_eq!(d.select(Regime::Unknown), SelectedStrategy::None);
    }
}
