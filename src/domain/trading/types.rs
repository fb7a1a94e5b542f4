use crate::domain::market::timeframe::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable OHLCV record (spec §3). Invariants are checked at construction
/// time; the constructor is the only way to obtain one so every `Candle` in
/// the system is known-valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub t_open: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        t_open: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, String> {
        let candle = Self {
            symbol: symbol.into(),
            timeframe,
            t_open,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    fn validate(&self) -> Result<(), String> {
        if self.volume < Decimal::ZERO {
            return Err(format!("negative volume: {}", self.volume));
        }
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if !(self.low <= body_low && body_high <= self.high) {
            return Err(format!(
                "candle OHLC invariant violated: low={} open={} close={} high={}",
                self.low, self.open, self.close, self.high
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for Buy, -1 for Sell — used by PnL sign conventions in spec §4.8.
    pub fn sign(self) -> i64 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Why a signal/order exists, used for diagnostics and close-all reduce-only
/// filtering (spec §3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purpose {
    Entry,
    Exit,
    Addon,
    Hedge,
    EmergencyClose,
}

impl Purpose {
    /// Entries are blocked in STANDBY/KILL_SWITCH/EMERGENCY; exits never are.
    pub fn is_entry_like(self) -> bool {
        matches!(self, Purpose::Entry | Purpose::Addon)
    }
}

/// Emitted by strategies, consumed by the RiskFilter then the OMS (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub amount: Decimal,
    pub purpose: Purpose,
    pub strategy_tag: String,
    /// Maker-only flag for resting LIMIT orders (spec §4.5 grid entries):
    /// never set for MARKET/STOP signals.
    pub post_only: bool,
}

impl Signal {
    /// Enforces "`price` required iff type in {LIMIT, STOP_LIMIT}" (spec §3).
    pub fn validate(&self) -> Result<(), String> {
        let needs_price = matches!(self.order_type, OrderType::Limit | OrderType::StopLimit);
        if needs_price && self.price.is_none() {
            return Err(format!(
                "{:?} signal for {} requires a price",
                self.order_type, self.symbol
            ));
        }
        if !needs_price && self.price.is_some() && self.order_type == OrderType::Market {
            return Err("MARKET signal must not carry a price".to_string());
        }
        if self.post_only && self.order_type != OrderType::Limit {
            return Err(format!(
                "post_only is only valid on LIMIT signals, got {:?}",
                self.order_type
            ));
        }
        if self.amount <= Decimal::ZERO {
            return Err(format!("signal amount must be positive: {}", self.amount));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Placed,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A system-tracked order (spec §3, §4.7). `id` is assigned at creation and
/// never changes; `exchange_order_id` is filled in once placement succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled_amount: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_t: i64,
    pub last_update_t: i64,
    pub stop_price: Option<Decimal>,
    pub purpose: Purpose,
    pub strategy_tag: String,
    pub reduce_only: bool,
    pub post_only: bool,
}

impl Order {
    pub fn from_signal(signal: &Signal, id: String, now: i64) -> Self {
        Self {
            id,
            exchange_order_id: None,
            symbol: signal.symbol.clone(),
            side: signal.side,
            order_type: signal.order_type,
            price: signal.price,
            amount: signal.amount,
            filled_amount: Decimal::ZERO,
            avg_fill_price: None,
            status: OrderStatus::Open,
            created_t: now,
            last_update_t: now,
            stop_price: signal.stop_price,
            purpose: signal.purpose,
            strategy_tag: signal.strategy_tag.clone(),
            reduce_only: matches!(
                signal.purpose,
                Purpose::Exit | Purpose::EmergencyClose | Purpose::Hedge
            ),
            post_only: signal.post_only,
        }
    }

    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled_amount
    }

    /// Invariant from spec §3/§8: `0 <= filled_amount <= amount`.
    pub fn check_fill_invariant(&self) -> bool {
        self.filled_amount >= Decimal::ZERO && self.filled_amount <= self.amount
    }
}

/// A single fill event (spec §3). Duplicate detection key is
/// `(exchange_order_id, exchange_trade_id)` per spec §4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub exchange_order_id: Option<String>,
    pub exchange_trade_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub t: i64,
    pub fee: Option<Decimal>,
}

/// Process-wide mode, guarded by the mode-transition channel (spec §4.3, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemMode {
    Normal,
    RiskReduction,
    Standby,
    Emergency,
    KillSwitch,
}

impl SystemMode {
    /// KILL_SWITCH/STANDBY/EMERGENCY reject new ENTRY/ADDON signals (spec §4.3, §4.6 rule 1).
    pub fn blocks_entries(self) -> bool {
        matches!(
            self,
            SystemMode::Standby | SystemMode::KillSwitch | SystemMode::Emergency
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SystemMode::KillSwitch)
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemMode::Normal => "running",
            SystemMode::RiskReduction => "risk_reduction",
            SystemMode::Standby => "standby",
            SystemMode::Emergency => "emergency",
            SystemMode::KillSwitch => "kill_switch",
        };
        write!(f, "{}", s)
    }
}

/// One open position per `(symbol, exchange)` (spec §3, §4.8). Owned
/// authoritatively by `PositionBook`; a snapshot is mirrored onto `Account`
/// (below) so the risk filter can see existing exposure without threading a
/// second lock through every call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub exchange_id: String,
    pub side: OrderSide,
    pub amount: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    pub stop_price: Option<Decimal>,
    pub opened_t: i64,
    pub trailing_high: Option<Decimal>,
}

impl Position {
    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.avg_entry_price) * self.amount * Decimal::from(self.side.sign())
    }

    /// Notional value of the open position at its current mark (spec §4.6
    /// step 4's cumulative `open_notional` check).
    pub fn notional(&self) -> Decimal {
        self.amount.abs() * self.current_price
    }
}

/// Account-level rollup (spec §3). `midnight_balance` anchors daily PnL.
///
/// `daily_pnl` tracks realised PnL only, booked synchronously by the OMS as
/// fills close or reduce positions (the single-writer side of spec §5);
/// `unrealized_pnl` is the live mark-to-market total across every open
/// position, refreshed by whoever holds the current `PositionBook` snapshot
/// (`application::system::OmsSupervisor::sync_positions`). Spec §9 decision
/// (b) mandates "realised + unrealised change since midnight" as the
/// reported daily PnL, which is exactly `daily_pnl + unrealized_pnl` here
/// since `unrealized_pnl` is re-marked from zero at every midnight rollover
/// alongside `daily_pnl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub balance: Decimal,
    pub available: Decimal,
    pub midnight_balance: Decimal,
    pub midnight_day: i64,
    pub daily_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Open positions across every symbol (spec §3's `positions[]`), mirrored
    /// here from the `PositionBook` by `OmsSupervisor::sync_positions` /
    /// `EngineTask::run` on every tick. Empty in any `Account` built by hand
    /// (tests, scenarios that don't model an open position).
    pub positions: Vec<Position>,
}

impl Account {
    pub fn new(initial_balance: Decimal, midnight_day: i64) -> Self {
        Self {
            balance: initial_balance,
            available: initial_balance,
            midnight_balance: initial_balance,
            midnight_day,
            daily_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            positions: Vec::new(),
        }
    }

    /// Sum of open notional for `symbol` across every mirrored position
    /// (spec §4.6 step 4: "reject if the signal would make `open_notional >
    /// max_position_size * balance`", where `open_notional` is cumulative
    /// across the symbol's existing position plus the new signal).
    pub fn open_notional_for(&self, symbol: &str) -> Decimal {
        self.positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(Position::notional)
            .sum()
    }

    /// Realised-plus-unrealised daily PnL (spec §4.8, §9 decision (b)).
    pub fn total_daily_pnl(&self) -> Decimal {
        self.daily_pnl + self.unrealized_pnl
    }

    pub fn daily_pnl_pct(&self) -> Decimal {
        if self.midnight_balance == Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.total_daily_pnl() / self.midnight_balance
    }

    /// Day-rollover rule from spec §4.8/§8: on the first tick of a new UTC
    /// day, reset the midnight anchor to current equity and zero the PnL.
    /// `current_equity` must already include unrealised PnL (balance +
    /// unrealized_pnl) so the next day's anchor is a true mark-to-market.
    pub fn maybe_roll_midnight(&mut self, tick_day: i64, current_equity: Decimal) -> bool {
        if tick_day > self.midnight_day {
            self.midnight_day = tick_day;
            self.midnight_balance = current_equity;
            self.daily_pnl = Decimal::ZERO;
            self.unrealized_pnl = Decimal::ZERO;
            true
        } else {
            false
        }
    }
}

/// Normalises an exchange-native symbol (`SOLUSDT`) to the engine's
/// `BASE/QUOTE` form (spec §6, "Symbols are translated through a per-venue
/// mapping").
const CRYPTO_QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "BUSD", "TUSD", "USD", "BTC", "ETH"];

pub fn normalize_crypto_symbol(symbol: &str) -> Result<String, String> {
    if symbol.contains('/') {
        return Ok(symbol.to_string());
    }
    if symbol.is_empty() {
        return Err("cannot normalize empty symbol".to_string());
    }
    for quote in CRYPTO_QUOTE_CURRENCIES {
        if symbol.ends_with(quote) && symbol.len() > quote.len() {
            let base = &symbol[..symbol.len() - quote.len()];
            if !base.is_empty() && base.chars().all(|c| c.is_ascii_uppercase()) {
                return Ok(format!("{}/{}", base, quote));
            }
        }
    }
    Err(format!(
        "cannot normalize symbol '{}': no recognized quote currency",
        symbol
    ))
}

pub fn denormalize_crypto_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

/// Encodes a symbol for use as a filesystem path segment (spec §6:
/// "Symbols with `/` are encoded as `_`").
pub fn symbol_path_segment(symbol: &str) -> String {
    symbol.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn candle_rejects_inconsistent_ohlc() {
        let err = Candle::new(
            "SOL/USDT",
            Timeframe::OneHour,
            0,
            dec!(10),
            dec!(9), // high < open
            dec!(8),
            dec!(9.5),
            dec!(1),
        )
        .unwrap_err();
        assert!(err.contains("invariant"));
    }

    #[test]
    fn candle_rejects_negative_volume() {
        let err = Candle::new(
            "SOL/USDT",
            Timeframe::OneHour,
            0,
            dec!(10),
            dec!(11),
            dec!(9),
            dec!(10),
            dec!(-1),
        )
        .unwrap_err();
        assert!(err.contains("volume"));
    }

    #[test]
    fn candle_accepts_valid_ohlc() {
        let c = Candle::new(
            "SOL/USDT",
            Timeframe::OneHour,
            0,
            dec!(10),
            dec!(11),
            dec!(9),
            dec!(10.5),
            dec!(100),
        );
        assert!(c.is_ok());
    }

    #[test]
    fn signal_requires_price_for_limit() {
        let sig = Signal {
            symbol: "SOL/USDT".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: None,
            stop_price: None,
            amount: dec!(1),
            purpose: Purpose::Entry,
            strategy_tag: "trend".into(),
            post_only: false,
        };
        assert!(sig.validate().is_err());
    }

    #[test]
    fn post_only_is_rejected_on_market_signals() {
        let sig = Signal {
            symbol: "SOL/USDT".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            amount: dec!(1),
            purpose: Purpose::Entry,
            strategy_tag: "trend".into(),
            post_only: true,
        };
        assert!(sig.validate().is_err());
    }

    #[test]
    fn system_mode_blocks_entries_correctly() {
        assert!(SystemMode::Standby.blocks_entries());
        assert!(SystemMode::KillSwitch.blocks_entries());
        assert!(SystemMode::Emergency.blocks_entries());
        assert!(!SystemMode::Normal.blocks_entries());
    }

    #[test]
    fn account_midnight_rollover_zeroes_daily_pnl() {
        let mut acc = Account::new(dec!(10000), 19000);
        acc.daily_pnl = dec!(-500);
        let rolled = acc.maybe_roll_midnight(19001, dec!(9700));
        assert!(rolled);
        assert_eq!(acc.midnight_balance, dec!(9700));
        assert_eq!(acc.daily_pnl, Decimal::ZERO);
    }

    #[test]
    fn total_daily_pnl_includes_unrealized() {
        let mut acc = Account::new(dec!(10000), 19000);
        acc.daily_pnl = dec!(-100);
        acc.unrealized_pnl = dec!(-400);
        assert_eq!(acc.total_daily_pnl(), dec!(-500));
        assert_eq!(acc.daily_pnl_pct(), dec!(-0.05));
    }

    #[test]
    fn account_midnight_rollover_zeroes_unrealized_pnl_too() {
        let mut acc = Account::new(dec!(10000), 19000);
        acc.daily_pnl = dec!(-200);
        acc.unrealized_pnl = dec!(-300);
        acc.maybe_roll_midnight(19001, dec!(9500));
        assert_eq!(acc.unrealized_pnl, Decimal::ZERO);
        assert_eq!(acc.total_daily_pnl(), Decimal::ZERO);
    }

    #[test]
    fn normalize_and_denormalize_roundtrip() {
        let n = normalize_crypto_symbol("SOLUSDT").unwrap();
        assert_eq!(n, "SOL/USDT");
        assert_eq!(denormalize_crypto_symbol(&n), "SOLUSDT");
    }

    #[test]
    fn symbol_path_segment_encodes_slash() {
        assert_eq!(symbol_path_segment("SOL/USDT"), "SOL_USDT");
    }
}
