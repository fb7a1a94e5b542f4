//! TrendStrategy (spec §4.4): Donchian-breakout entries, ATR trailing stops,
//! and pyramiding add-ons while the regime stays trending.
//!
//! Signals carry a placeholder `amount` (one unit) for entries and add-ons;
//! `application::risk::risk_filter` is the single place that turns a stop
//! distance into a risk-sized quantity (spec §4.6/§4.10), so this module
//! never reads `RiskConfig` itself.

use crate::domain::config::TrendConfig;
use crate::domain::market::indicators::atr_fallback;
use crate::domain::market::regime::Regime;
use crate::domain::trading::types::{OrderSide, OrderType, Purpose, Signal};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::{StrategyContext, StrategyOutput, TradingStrategy};

/// Per-symbol bookkeeping the domain layer doesn't need to know about (spec
/// §9 decision): `initial_r` is fixed at entry and never recomputed, so
/// later add-ons are sized off the original risk distance, not the current
/// (possibly much wider) one.
#[derive(Debug, Clone, Default)]
struct TrendPositionState {
    initial_r: f64,
    entry_price: f64,
    pyramids_added: u32,
    last_addon_price: f64,
    regime_flip_bars: u32,
    last_stop: Option<f64>,
}

pub struct TrendStrategy {
    config: TrendConfig,
    state: HashMap<String, TrendPositionState>,
}

impl TrendStrategy {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            state: HashMap::new(),
        }
    }

    fn is_up(regime: Regime) -> bool {
        matches!(regime, Regime::StrongUp | Regime::Up | Regime::WeakUp)
    }

    fn is_down(regime: Regime) -> bool {
        matches!(regime, Regime::StrongDown | Regime::Down | Regime::WeakDown)
    }

    /// Stop distance is a function of volatility only — `size_factor` (the
    /// dispatcher's reduced-size hint) scales position size downstream in
    /// the risk filter, never the stop placement itself.
    fn stop_distance(&self, atr: f64, price: f64) -> f64 {
        atr_fallback(atr, price, 0.0001, 0.01, 0.02) * self.config.atr_trailing_stop_multiplier
    }

    fn try_enter(&mut self, ctx: &StrategyContext) -> StrategyOutput {
        let donchian = ctx.indicators.donchian(self.config.donchian_period, true);
        let Some((high, low, _mid)) = donchian else {
            return StrategyOutput::empty();
        };
        let close = decimal_to_f64(ctx.candle.close);
        let adx = ctx.indicators.adx().unwrap_or(0.0);
        if adx < self.config.adx_threshold {
            return StrategyOutput::empty();
        }

        let atr = ctx.indicators.atr().unwrap_or(0.0);
        let symbol = ctx.candle.symbol.clone();

        if close > high && Self::is_up(ctx.regime.regime) {
            let distance = self.stop_distance(atr, close);
            let stop = close - distance;
            self.state.insert(
                symbol.clone(),
                TrendPositionState {
                    initial_r: distance,
                    entry_price: close,
                    pyramids_added: 0,
                    last_addon_price: close,
                    regime_flip_bars: 0,
                    last_stop: Some(stop),
                },
            );
            let mut out = StrategyOutput::with_signal(Signal {
                symbol,
                side: OrderSide::Buy,
                order_type: OrderType::Market,
                price: None,
                stop_price: Decimal::from_f64(stop),
                amount: Decimal::ONE,
                purpose: Purpose::Entry,
                strategy_tag: "trend".into(),
                post_only: false,
            });
            out.diagnostics = out
                .diagnostics
                .note(format!("donchian breakout long above {high:.4}"));
            out.stop_price_update = Decimal::from_f64(stop);
            return out;
        }

        if close < low && Self::is_down(ctx.regime.regime) {
            let distance = self.stop_distance(atr, close);
            let stop = close + distance;
            self.state.insert(
                symbol.clone(),
                TrendPositionState {
                    initial_r: distance,
                    entry_price: close,
                    pyramids_added: 0,
                    last_addon_price: close,
                    regime_flip_bars: 0,
                    last_stop: Some(stop),
                },
            );
            let mut out = StrategyOutput::with_signal(Signal {
                symbol,
                side: OrderSide::Sell,
                order_type: OrderType::Market,
                price: None,
                stop_price: Decimal::from_f64(stop),
                amount: Decimal::ONE,
                purpose: Purpose::Entry,
                strategy_tag: "trend".into(),
                post_only: false,
            });
            out.diagnostics = out
                .diagnostics
                .note(format!("donchian breakout short below {low:.4}"));
            out.stop_price_update = Decimal::from_f64(stop);
            return out;
        }

        StrategyOutput::empty()
    }

    fn manage_open_position(&mut self, ctx: &StrategyContext) -> StrategyOutput {
        let position = ctx.position.expect("called only when a position exists");
        let symbol = position.symbol.clone();
        let close = decimal_to_f64(ctx.candle.close);
        let atr = ctx.indicators.atr().unwrap_or(0.0);
        let distance = self.stop_distance(atr, close);

        let Some(st) = self.state.get_mut(&symbol) else {
            // Position survived a restart with no local bookkeeping; seed it
            // conservatively rather than emitting anything this tick.
            self.state.insert(
                symbol.clone(),
                TrendPositionState {
                    initial_r: distance,
                    entry_price: decimal_to_f64(position.avg_entry_price),
                    pyramids_added: 0,
                    last_addon_price: decimal_to_f64(position.avg_entry_price),
                    regime_flip_bars: 0,
                    last_stop: position.stop_price.map(decimal_to_f64),
                },
            );
            return StrategyOutput::empty();
        };

        let mut output = StrategyOutput::empty();

        // Ratchet the trailing stop; never loosen it (spec §4.4).
        let candidate_stop = match position.side {
            OrderSide::Buy => close - distance,
            OrderSide::Sell => close + distance,
        };
        let improved = match (st.last_stop, position.side) {
            (Some(prev), OrderSide::Buy) => candidate_stop > prev,
            (Some(prev), OrderSide::Sell) => candidate_stop < prev,
            (None, _) => true,
        };
        if improved {
            st.last_stop = Some(candidate_stop);
            output.stop_price_update = Decimal::from_f64(candidate_stop);
        }

        // Pyramiding: each `add_on_position_multiplier * initial_r` of
        // favourable excursion beyond the last add, up to `max_pyramids`.
        if st.pyramids_added < self.config.max_pyramids && st.initial_r > 0.0 {
            let step = st.initial_r * self.config.add_on_position_multiplier;
            let favorable_move = match position.side {
                OrderSide::Buy => close - st.last_addon_price,
                OrderSide::Sell => st.last_addon_price - close,
            };
            if favorable_move >= step {
                st.pyramids_added += 1;
                st.last_addon_price = close;
                output.signals.push(Signal {
                    symbol: symbol.clone(),
                    side: position.side,
                    order_type: OrderType::Market,
                    price: None,
                    stop_price: Decimal::from_f64(candidate_stop),
                    amount: Decimal::ONE,
                    purpose: Purpose::Addon,
                    strategy_tag: "trend".into(),
                    post_only: false,
                });
                output.diagnostics = output
                    .diagnostics
                    .note(format!("pyramid add-on #{}", st.pyramids_added));
            }
        }

        // Regime-flip exit: two consecutive bars opposing the position's
        // direction close the position outright rather than waiting on the
        // resting stop order, which a sharp reversal can leapfrog.
        let opposing = match position.side {
            OrderSide::Buy => Self::is_down(ctx.regime.regime),
            OrderSide::Sell => Self::is_up(ctx.regime.regime),
        };
        if opposing {
            st.regime_flip_bars += 1;
        } else {
            st.regime_flip_bars = 0;
        }
        if st.regime_flip_bars >= 2 {
            self.state.remove(&symbol);
            output.signals.push(Signal {
                symbol,
                side: position.side.opposite(),
                order_type: OrderType::Market,
                price: None,
                stop_price: None,
                amount: position.amount,
                purpose: Purpose::Exit,
                strategy_tag: "trend".into(),
                post_only: false,
            });
            output.diagnostics = output.diagnostics.note("regime flipped against position, exiting");
        }

        output
    }
}

impl TradingStrategy for TrendStrategy {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn on_tick(&mut self, ctx: &StrategyContext) -> StrategyOutput {
        match ctx.position {
            None => self.try_enter(ctx),
            Some(_) => self.manage_open_position(ctx),
        }
    }
}

fn decimal_to_f64(d: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::indicators::IndicatorState;
    use crate::domain::market::regime::{RegimeFeatures, RegimeSnapshot};
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::trading::position_book::Position;
    use crate::domain::trading::types::{Account, Candle};
    use rust_decimal_macros::dec;

    fn candle(t: i64, close: f64) -> Candle {
        let c = Decimal::try_from(close).unwrap();
        Candle::new(
            "SOL/USDT",
            Timeframe::OneHour,
            t,
            c,
            c + dec!(0.2),
            c - dec!(0.2),
            c,
            dec!(1000),
        )
        .unwrap()
    }

    fn snapshot(regime: Regime) -> RegimeSnapshot {
        RegimeSnapshot {
            regime,
            features: RegimeFeatures {
                ema_slope_deg: 10.0,
                atr_pct: 1.0,
                adx: 30.0,
            },
        }
    }

    #[test]
    fn breakout_above_donchian_high_emits_long_entry() {
        let mut strategy = TrendStrategy::new(TrendConfig::default());
        let mut indicators = IndicatorState::new("SOL/USDT", 5, 10, 14, 14, 5);
        for i in 0..30 {
            indicators.update(candle(i * 3_600_000, 100.0));
        }
        let breakout = candle(30 * 3_600_000, 110.0);
        let account = Account::new(dec!(10000), 19000);

        let ctx = StrategyContext {
            candle: &breakout,
            indicators: &indicators,
            regime: snapshot(Regime::Up),
            position: None,
            account: &account,
            size_factor: 1.0,
        };
        let out = strategy.on_tick(&ctx);
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].side, OrderSide::Buy);
        assert_eq!(out.signals[0].purpose, Purpose::Entry);
        assert!(out.stop_price_update.is_some());
    }

    #[test]
    fn regime_flip_closes_after_two_opposing_bars() {
        let mut strategy = TrendStrategy::new(TrendConfig::default());
        let indicators = IndicatorState::new("SOL/USDT", 5, 10, 14, 14, 5);
        let account = Account::new(dec!(10000), 19000);
        let position = Position {
            symbol: "SOL/USDT".into(),
            exchange_id: "binance".into(),
            side: OrderSide::Buy,
            amount: dec!(10),
            avg_entry_price: dec!(100),
            current_price: dec!(100),
            stop_price: Some(dec!(95)),
            opened_t: 0,
            trailing_high: None,
        };
        let c = candle(0, 100.0);

        let ctx = StrategyContext {
            candle: &c,
            indicators: &indicators,
            regime: snapshot(Regime::Down),
            position: Some(&position),
            account: &account,
            size_factor: 1.0,
        };
        let first = strategy.on_tick(&ctx);
        assert!(first.signals.is_empty());

        let second = strategy.on_tick(&ctx);
        assert_eq!(second.signals.len(), 1);
        assert_eq!(second.signals[0].purpose, Purpose::Exit);
        assert_eq!(second.signals[0].side, OrderSide::Sell);
    }
}
