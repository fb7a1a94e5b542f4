//! RangeStrategy (spec §4.5): grid trading inside the recent range, with an
//! escape exit when price breaks out of the grid envelope.
//!
//! Like Trend, grid orders carry a placeholder `amount`; the risk filter
//! sizes each level independently so the grid's total net exposure respects
//! `RiskConfig::max_position_size` (spec §4.6).

use crate::domain::config::RangeConfig;
use crate::domain::trading::types::{OrderSide, OrderType, Purpose, Signal};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::{StrategyContext, StrategyOutput, TradingStrategy};

#[derive(Debug, Clone)]
struct GridState {
    lower: f64,
    upper: f64,
    levels: Vec<f64>,
    net_position_side: Option<OrderSide>,
}

pub struct RangeStrategy {
    config: RangeConfig,
    grids: HashMap<String, GridState>,
}

impl RangeStrategy {
    pub fn new(config: RangeConfig) -> Self {
        Self {
            config,
            grids: HashMap::new(),
        }
    }

    /// Builds (or rebuilds) the grid levels across the Donchian range,
    /// spaced by `grid_width_multiplier * ATR`, clamped to
    /// `[grid_levels_min, grid_levels_max]` levels (spec §4.5).
    fn build_grid(&self, low: f64, high: f64, atr: f64) -> GridState {
        let span = (high - low).max(1e-9);
        let step = (self.config.grid_width_multiplier * atr).max(span / self.config.grid_levels_max as f64);
        let mut level_count = (span / step.max(1e-9)).floor() as i64;
        level_count = level_count.clamp(
            self.config.grid_levels_min as i64,
            self.config.grid_levels_max as i64,
        );
        let mut levels = Vec::with_capacity(level_count as usize + 1);
        for i in 0..=level_count {
            levels.push(low + step * i as f64);
        }
        GridState {
            lower: low,
            upper: high,
            levels,
            net_position_side: None,
        }
    }

    fn nearest_level(levels: &[f64], price: f64) -> Option<f64> {
        levels
            .iter()
            .copied()
            .min_by(|a, b| (a - price).abs().partial_cmp(&(b - price).abs()).unwrap())
    }
}

impl TradingStrategy for RangeStrategy {
    fn name(&self) -> &'static str {
        "range"
    }

    fn on_tick(&mut self, ctx: &StrategyContext) -> StrategyOutput {
        let Some((high, low, _mid)) = ctx.indicators.donchian(self.config.range_period, true) else {
            return StrategyOutput::empty();
        };
        let atr = ctx.indicators.atr().unwrap_or(0.0);
        let close = ctx.candle.close.to_f64().unwrap_or(0.0);
        let symbol = ctx.candle.symbol.clone();
        let mut output = StrategyOutput::empty();

        let span = (high - low).max(1e-9);
        let escape_hi = high + span * self.config.escape_threshold;
        let escape_lo = low - span * self.config.escape_threshold;

        // Escape: price has broken out of the grid envelope, flatten and
        // drop the grid so Trend can take over once the dispatcher switches
        // regimes.
        if close > escape_hi || close < escape_lo {
            self.grids.remove(&symbol);
            if let Some(position) = ctx.position {
                output.signals.push(Signal {
                    symbol,
                    side: position.side.opposite(),
                    order_type: OrderType::Market,
                    price: None,
                    stop_price: None,
                    amount: position.amount,
                    purpose: Purpose::Exit,
                    strategy_tag: "range".into(),
                    post_only: false,
                });
                output.diagnostics = output.diagnostics.note("grid escape, flattening");
            }
            return output;
        }

        let grid = self
            .grids
            .entry(symbol.clone())
            .or_insert_with(|| self.build_grid(low, high, atr));

        // Rebuild when the range has drifted materially away from the grid
        // that was fit to the previous window.
        if (grid.lower - low).abs() > span * 0.25 || (grid.upper - high).abs() > span * 0.25 {
            *grid = self.build_grid(low, high, atr);
        }

        let net_amount = ctx.position.map(|p| p.amount).unwrap_or(Decimal::ZERO);
        let net_delta_cap = Decimal::from_f64(self.config.net_position_delta_max)
            .unwrap_or(Decimal::ZERO)
            * ctx.account.balance;
        if net_amount.abs() >= net_delta_cap && net_delta_cap > Decimal::ZERO {
            output.diagnostics = output
                .diagnostics
                .note("grid net position delta cap reached, skipping new level");
            return output;
        }

        let Some(level) = Self::nearest_level(&grid.levels, close) else {
            return output;
        };
        let distance_to_level = (close - level).abs() / close.max(1e-9);
        if distance_to_level > 0.001 {
            // Not actually at a grid line this tick; place resting limit
            // orders either side rather than a market order.
            let level_below = grid
                .levels
                .iter()
                .copied()
                .filter(|l| *l < close)
                .fold(f64::MIN, f64::max);
            let level_above = grid
                .levels
                .iter()
                .copied()
                .filter(|l| *l > close)
                .fold(f64::MAX, f64::min);

            if level_below.is_finite() {
                output.signals.push(Signal {
                    symbol: symbol.clone(),
                    side: OrderSide::Buy,
                    order_type: OrderType::Limit,
                    price: Decimal::from_f64(level_below),
                    // Protective stop at the lower escape boundary: the
                    // risk filter needs a non-degenerate distance to size
                    // the level, and the escape threshold is the price the
                    // grid itself treats as "this level has failed".
                    stop_price: Decimal::from_f64(escape_lo),
                    amount: Decimal::ONE,
                    purpose: Purpose::Entry,
                    strategy_tag: "range".into(),
                    // Grid entries rest as maker-only limits (spec §4.5).
                    post_only: true,
                });
            }
            if level_above.is_finite() {
                output.signals.push(Signal {
                    symbol,
                    side: OrderSide::Sell,
                    order_type: OrderType::Limit,
                    price: Decimal::from_f64(level_above),
                    stop_price: Decimal::from_f64(escape_hi),
                    amount: Decimal::ONE,
                    purpose: Purpose::Entry,
                    strategy_tag: "range".into(),
                    // Grid entries rest as maker-only limits (spec §4.5).
                    post_only: true,
                });
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::indicators::IndicatorState;
    use crate::domain::market::regime::{RegimeFeatures, RegimeSnapshot};
    use crate::domain::market::regime::Regime;
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::trading::types::{Account, Candle};
    use rust_decimal_macros::dec;

    fn candle(t: i64, close: f64) -> Candle {
        let c = Decimal::try_from(close).unwrap();
        Candle::new(
            "SOL/USDT",
            Timeframe::OneHour,
            t,
            c,
            c + dec!(0.1),
            c - dec!(0.1),
            c,
            dec!(1000),
        )
        .unwrap()
    }

    #[test]
    fn places_resting_limit_orders_inside_the_range() {
        let mut strategy = RangeStrategy::new(RangeConfig::default());
        let mut indicators = IndicatorState::new("SOL/USDT", 5, 10, 14, 14, 5);
        // Oscillate between 95 and 105 to build a stable range.
        for i in 0..40 {
            let price = if i % 2 == 0 { 95.0 } else { 105.0 };
            indicators.update(candle(i * 3_600_000, price));
        }
        let c = candle(40 * 3_600_000, 100.0);
        let account = Account::new(dec!(10000), 19000);
        let ctx = StrategyContext {
            candle: &c,
            indicators: &indicators,
            regime: RegimeSnapshot {
                regime: Regime::Range,
                features: RegimeFeatures {
                    ema_slope_deg: 0.0,
                    atr_pct: 2.0,
                    adx: 10.0,
                },
            },
            position: None,
            account: &account,
            size_factor: 1.0,
        };
        let out = strategy.on_tick(&ctx);
        assert!(!out.signals.is_empty());
        assert!(out.signals.iter().all(|s| s.post_only));
        assert!(out.signals.iter().all(|s| s.stop_price.is_some()));
    }

    #[test]
    fn escape_above_range_flattens_existing_position() {
        use crate::domain::trading::position_book::Position;

        let mut strategy = RangeStrategy::new(RangeConfig::default());
        let mut indicators = IndicatorState::new("SOL/USDT", 5, 10, 14, 14, 5);
        for i in 0..40 {
            let price = if i % 2 == 0 { 95.0 } else { 105.0 };
            indicators.update(candle(i * 3_600_000, price));
        }
        let spike = candle(40 * 3_600_000, 140.0);
        let account = Account::new(dec!(10000), 19000);
        let position = Position {
            symbol: "SOL/USDT".into(),
            exchange_id: "binance".into(),
            side: OrderSide::Buy,
            amount: dec!(5),
            avg_entry_price: dec!(100),
            current_price: dec!(140),
            stop_price: None,
            opened_t: 0,
            trailing_high: None,
        };
        let ctx = StrategyContext {
            candle: &spike,
            indicators: &indicators,
            regime: RegimeSnapshot {
                regime: Regime::Up,
                features: RegimeFeatures {
                    ema_slope_deg: 10.0,
                    atr_pct: 8.0,
                    adx: 30.0,
                },
            },
            position: Some(&position),
            account: &account,
            size_factor: 1.0,
        };
        let out = strategy.on_tick(&ctx);
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].purpose, Purpose::Exit);
        assert_eq!(out.signals[0].side, OrderSide::Sell);
    }
}
