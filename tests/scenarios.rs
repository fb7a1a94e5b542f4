//! End-to-end pipeline scenarios driven directly through `EngineCore`,
//! without the tokio task scaffolding around it — the same split the
//! indicator/strategy unit tests already rely on.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use solbot_core::application::engine::EngineCore;
use solbot_core::domain::config::{MarketConfig, RangeConfig, RiskConfig, TrendConfig};
use solbot_core::domain::market::timeframe::Timeframe;
use solbot_core::domain::trading::position_book::Position;
use solbot_core::domain::trading::types::{Account, Candle, OrderSide, OrderType, Purpose, SystemMode};

const HOUR_MS: i64 = 3_600_000;

fn engine() -> EngineCore {
    EngineCore::new(
        MarketConfig::default(),
        TrendConfig::default(),
        RangeConfig::default(),
        RiskConfig::default(),
    )
}

/// Entry signals carry a real stop distance, so a position-size cap can
/// legitimately reject them (spec §4.6: "reject, don't shrink" is the
/// default). These scenarios only care that the strategy layer fires, so
/// they allow shrinking instead of rejecting outright.
fn engine_allowing_shrink() -> EngineCore {
    let mut risk = RiskConfig::default();
    risk.allow_shrink = true;
    EngineCore::new(
        MarketConfig::default(),
        TrendConfig::default(),
        RangeConfig::default(),
        risk,
    )
}

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
fn trend_breakout_enters_and_updates_trailing_stop() {
    let mut core = engine_allowing_shrink();
    let account = Account::new(dec!(10000), 19000);

    let mut entered = false;
    let mut saw_stop_update = false;
    for i in 0..150 {
        let c = candle(i * HOUR_MS, 100.0 + i as f64 * 2.0);
        let outcome = core.on_candle(c, &account, None);
        if outcome.stop_price_update.is_some() {
            saw_stop_update = true;
        }
        for signal in &outcome.signals {
            if signal.purpose == Purpose::Entry {
                assert_eq!(signal.side, OrderSide::Buy);
                assert_eq!(signal.order_type, OrderType::Market);
                assert!(signal.stop_price.unwrap() < c_close(i, 100.0));
                entered = true;
            }
        }
        if entered {
            break;
        }
    }

    assert!(entered, "a sustained uptrend must eventually trigger a Donchian breakout entry");
    assert!(saw_stop_update, "the entry tick must also publish an initial trailing-stop price");
}

fn c_close(i: i64, base: f64) -> Decimal {
    Decimal::try_from(base + i as f64 * 2.0).unwrap()
}

#[test]
fn ranging_market_rests_grid_limits_then_escape_flattens_position() {
    let mut core = engine_allowing_shrink();
    let account = Account::new(dec!(10000), 19000);

    let mut saw_grid_limit = false;
    for i in 0..90 {
        let price = if i % 2 == 0 { 98.0 } else { 102.0 };
        let outcome = core.on_candle(candle(i * HOUR_MS, price), &account, None);
        if outcome
            .signals
            .iter()
            .any(|s| s.order_type == OrderType::Limit && s.post_only)
        {
            saw_grid_limit = true;
        }
    }
    assert!(saw_grid_limit, "a stable range must produce maker-only grid entries");

    let position = Position {
        symbol: "SOL/USDT".into(),
        exchange_id: "binance".into(),
        side: OrderSide::Buy,
        amount: dec!(5),
        avg_entry_price: dec!(100),
        current_price: dec!(100),
        stop_price: None,
        opened_t: 0,
        trailing_high: None,
    };
    let breakout = candle(91 * HOUR_MS, 160.0);
    let outcome = core.on_candle(breakout, &account, Some(&position));
    let exit = outcome
        .signals
        .iter()
        .find(|s| s.purpose == Purpose::Exit)
        .expect("price breaking far outside the grid envelope must flatten the open position");
    assert_eq!(exit.side, OrderSide::Sell);
    assert_eq!(exit.amount, dec!(5));
}

#[test]
fn black_swan_intraday_move_forces_emergency_and_flattens() {
    let mut core = engine();
    let account = Account::new(dec!(10000), 19000);

    let first = core.on_candle(candle(0, 100.0), &account, None);
    assert_eq!(first.mode, Some(SystemMode::Normal));

    let position = Position {
        symbol: "SOL/USDT".into(),
        exchange_id: "binance".into(),
        side: OrderSide::Buy,
        amount: dec!(3),
        avg_entry_price: dec!(100),
        current_price: dec!(100),
        stop_price: None,
        opened_t: 0,
        trailing_high: None,
    };
    // -20% within the same UTC day trips the black-swan sentinel (default
    // threshold 0.15).
    let shock = core.on_candle(candle(HOUR_MS, 80.0), &account, Some(&position));
    assert_eq!(shock.mode, Some(SystemMode::Emergency));
    let flatten = shock
        .signals
        .iter()
        .find(|s| s.purpose == Purpose::EmergencyClose)
        .expect("emergency mode must flatten the open position");
    assert_eq!(flatten.side, OrderSide::Sell);
    assert_eq!(flatten.amount, dec!(3));
}

#[test]
fn daily_loss_breach_enters_standby_and_blocks_entries() {
    let mut core = engine();
    let mut account = Account::new(dec!(10000), 19000);
    // max_daily_loss defaults to 0.05; -6% breaches it.
    account.daily_pnl = dec!(-600);

    let outcome = core.on_candle(candle(0, 100.0), &account, None);
    assert_eq!(outcome.mode, Some(SystemMode::Standby));
    assert!(outcome.signals.is_empty(), "STANDBY must not emit any entry signals");
}
