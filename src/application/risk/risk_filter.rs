//! RiskFilter (spec §4.6): enforces entry gating by `SystemMode`, the daily
//! loss limit, and per-trade position sizing from a signal's stop distance.
//!
//! Every entry/addon `Signal` arrives with a placeholder `amount` (spec
//! §4.4/§4.5 strategies never size themselves); this is the one place that
//! turns `risk_amount / stop_distance` into the real order quantity, capped
//! by `max_position_size` against the symbol's *cumulative* open notional —
//! existing position plus this signal, read from `Account::positions`.

use crate::domain::config::RiskConfig;
use crate::domain::errors::RiskError;
use crate::domain::trading::types::{Account, Signal, SystemMode};
use rust_decimal::Decimal;
use tracing::warn;

pub struct RiskContext<'a> {
    pub mode: SystemMode,
    /// `account.positions` carries the symbol's existing open exposure, used
    /// by the position-size cap below (spec §4.6 step 4).
    pub account: &'a Account,
    /// Last traded price for the signal's symbol, used as the entry-price
    /// proxy for MARKET orders (which carry no `price`).
    pub current_price: Decimal,
}

pub struct RiskFilter {
    config: RiskConfig,
}

impl RiskFilter {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Evaluates every signal, dropping (and logging) the ones the risk
    /// filter rejects and resizing the ones it accepts.
    pub fn apply(&self, signals: Vec<Signal>, ctx: &RiskContext) -> Vec<Signal> {
        signals
            .into_iter()
            .filter_map(|signal| match self.evaluate(signal, ctx) {
                Ok(sized) => Some(sized),
                Err((tag, symbol, err)) => {
                    warn!(strategy = %tag, symbol = %symbol, error = %err, "risk filter rejected signal");
                    None
                }
            })
            .collect()
    }

    #[allow(clippy::type_complexity)]
    fn evaluate(
        &self,
        mut signal: Signal,
        ctx: &RiskContext,
    ) -> Result<Signal, (String, String, RiskError)> {
        let fail = |signal: &Signal, e: RiskError| (signal.strategy_tag.clone(), signal.symbol.clone(), e);

        if !signal.purpose.is_entry_like() {
            // Exits and emergency closes are never resized or blocked: the
            // engine must always be able to flatten a position.
            return Ok(signal);
        }

        if ctx.mode.blocks_entries() {
            return Err(fail(
                &signal,
                RiskError::EntriesBlocked {
                    mode: ctx.mode.to_string(),
                },
            ));
        }

        let max_daily_loss = Decimal::try_from(self.config.max_daily_loss).unwrap_or(Decimal::ZERO);
        if ctx.account.daily_pnl_pct() <= -max_daily_loss {
            return Err(fail(
                &signal,
                RiskError::DailyLossLimitBreached {
                    daily_pnl_pct: ctx.account.daily_pnl_pct(),
                    max_daily_loss,
                },
            ));
        }

        if let Err(reason) = signal.validate() {
            return Err(fail(&signal, RiskError::InvalidSignal { reason }));
        }

        let entry_price = signal.price.unwrap_or(ctx.current_price);
        if entry_price <= Decimal::ZERO {
            return Err(fail(
                &signal,
                RiskError::InvalidSignal {
                    reason: "entry price must be positive".to_string(),
                },
            ));
        }

        let stop = signal.stop_price.unwrap_or(entry_price);
        let distance = (entry_price - stop).abs();
        if distance <= Decimal::ZERO {
            return Err(fail(&signal, RiskError::DegenerateStopDistance { distance }));
        }

        let risk_amount = ctx.account.balance * self.config.max_risk_per_trade_decimal();
        let mut amount = risk_amount / distance;

        // spec §4.6 step 4: the cap is on *cumulative* open notional for the
        // symbol, not just this signal's own size — an existing position
        // plus a pyramid add-on must together stay under
        // `max_position_size * balance`.
        let max_notional = ctx.account.balance * self.config.max_position_size_decimal();
        let existing_notional = ctx.account.open_notional_for(&signal.symbol);
        let headroom_notional = (max_notional - existing_notional).max(Decimal::ZERO);
        let cap_amount = headroom_notional / entry_price;
        if amount > cap_amount {
            if !self.config.allow_shrink {
                return Err(fail(
                    &signal,
                    RiskError::PositionSizeCapExceeded { cap: cap_amount },
                ));
            }
            amount = cap_amount;
        }

        if amount <= Decimal::ZERO {
            return Err(fail(
                &signal,
                RiskError::InvalidSignal {
                    reason: "sized amount rounded to zero".to_string(),
                },
            ));
        }

        signal.amount = amount;
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{OrderSide, OrderType, Purpose};
    use rust_decimal_macros::dec;

    fn entry_signal(stop: Decimal) -> Signal {
        Signal {
            symbol: "SOL/USDT".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: None,
            stop_price: Some(stop),
            amount: Decimal::ONE,
            purpose: Purpose::Entry,
            strategy_tag: "trend".into(),
            post_only: false,
        }
    }

    #[test]
    fn sizes_entry_from_risk_amount_over_stop_distance() {
        let filter = RiskFilter::new(RiskConfig::default());
        let account = Account::new(dec!(10000), 19000);
        let ctx = RiskContext {
            mode: SystemMode::Normal,
            account: &account,
            current_price: dec!(100),
        };
        let out = filter.apply(vec![entry_signal(dec!(90))], &ctx);
        assert_eq!(out.len(), 1);
        // risk_amount = 10000 * 0.01 = 100; distance = 10 -> amount = 10,
        // comfortably under the 35-unit max_position_size cap.
        assert_eq!(out[0].amount, dec!(10));
    }

    #[test]
    fn blocks_entries_in_standby() {
        let filter = RiskFilter::new(RiskConfig::default());
        let account = Account::new(dec!(10000), 19000);
        let ctx = RiskContext {
            mode: SystemMode::Standby,
            account: &account,
            current_price: dec!(100),
        };
        let out = filter.apply(vec![entry_signal(dec!(98))], &ctx);
        assert!(out.is_empty());
    }

    #[test]
    fn caps_position_size_and_rejects_when_shrink_disallowed() {
        let mut config = RiskConfig::default();
        config.max_risk_per_trade = 0.5; // deliberately oversized request
        let filter = RiskFilter::new(config);
        let account = Account::new(dec!(10000), 19000);
        let ctx = RiskContext {
            mode: SystemMode::Normal,
            account: &account,
            current_price: dec!(100),
        };
        let out = filter.apply(vec![entry_signal(dec!(99.9))], &ctx);
        assert!(out.is_empty(), "oversized signal must be rejected, not shrunk, when allow_shrink is false");
    }

    fn existing_position(symbol: &str, notional: Decimal) -> crate::domain::trading::types::Position {
        crate::domain::trading::types::Position {
            symbol: symbol.to_string(),
            exchange_id: "binance".into(),
            side: OrderSide::Buy,
            amount: Decimal::ONE,
            avg_entry_price: notional,
            current_price: notional,
            stop_price: None,
            opened_t: 0,
            trailing_high: None,
        }
    }

    #[test]
    fn position_size_cap_accounts_for_existing_open_notional() {
        // 30% of the 10,000 balance is already open on SOL/USDT; the
        // default 35% cap leaves only 5% = 500 of headroom, so a 10%-sized
        // addon (would-be 1000 notional) must be rejected outright.
        let filter = RiskFilter::new(RiskConfig::default());
        let mut account = Account::new(dec!(10000), 19000);
        account.positions.push(existing_position("SOL/USDT", dec!(3000)));
        let ctx = RiskContext {
            mode: SystemMode::Normal,
            account: &account,
            current_price: dec!(100),
        };
        // distance 10 against a risk_amount of 100 (1% of 10000) sizes to 10
        // units @ 100 = 1000 notional, which alone is under the cap but
        // pushes cumulative notional to 4000 > 3500.
        let out = filter.apply(vec![entry_signal(dec!(90))], &ctx);
        assert!(
            out.is_empty(),
            "addon must be rejected once existing + new notional exceeds max_position_size * balance"
        );
    }

    #[test]
    fn position_size_cap_shrinks_addon_to_remaining_headroom() {
        let mut config = RiskConfig::default();
        config.allow_shrink = true;
        let filter = RiskFilter::new(config);
        let mut account = Account::new(dec!(10000), 19000);
        account.positions.push(existing_position("SOL/USDT", dec!(3000)));
        let ctx = RiskContext {
            mode: SystemMode::Normal,
            account: &account,
            current_price: dec!(100),
        };
        // Headroom is 3500 - 3000 = 500 notional, i.e. 5 units @ 100.
        let out = filter.apply(vec![entry_signal(dec!(90))], &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].amount, dec!(5));
    }

    #[test]
    fn other_symbols_open_notional_does_not_count_against_the_cap() {
        let filter = RiskFilter::new(RiskConfig::default());
        let mut account = Account::new(dec!(10000), 19000);
        account.positions.push(existing_position("BTC/USDT", dec!(3000)));
        let ctx = RiskContext {
            mode: SystemMode::Normal,
            account: &account,
            current_price: dec!(100),
        };
        let out = filter.apply(vec![entry_signal(dec!(90))], &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].amount, dec!(10));
    }

    #[test]
    fn exits_always_pass_through_unsized() {
        let filter = RiskFilter::new(RiskConfig::default());
        let account = Account::new(dec!(10000), 19000);
        let ctx = RiskContext {
            mode: SystemMode::Standby,
            account: &account,
            current_price: dec!(100),
        };
        let exit = Signal {
            symbol: "SOL/USDT".into(),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            amount: dec!(7),
            purpose: Purpose::Exit,
            strategy_tag: "trend".into(),
            post_only: false,
        };
        let out = filter.apply(vec![exit], &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].amount, dec!(7));
    }
}
