//! Strategy layer (spec §4.4, §4.5, §4.3, §9): Donchian-breakout trend
//! following, grid/range trading, and the emergency flattening strategy, all
//! selected by [`dispatcher::StrategyDispatcher`] from mode x regime.
//!
//! Strategy results are a sum type (spec §9), not a duck-typed
//! `{signals, metadata}` map: every strategy returns a [`StrategyOutput`].

pub mod dispatcher;
pub mod emergency;
pub mod range;
pub mod trend;

use crate::domain::market::indicators::IndicatorState;
use crate::domain::market::regime::RegimeSnapshot;
use crate::domain::trading::position_book::Position;
use crate::domain::trading::types::{Account, Candle, Signal};

/// Everything a strategy needs to produce signals for one tick, gathered by
/// the `EngineTask` pipeline (spec §4.11 steps 2-5) before dispatch.
pub struct StrategyContext<'a> {
    pub candle: &'a Candle,
    pub indicators: &'a IndicatorState,
    pub regime: RegimeSnapshot,
    pub position: Option<&'a Position>,
    pub account: &'a Account,
    /// `1.0` for full size, `<1.0` for the dispatcher's reduced-size Trend
    /// variant (spec §4.3: "NORMAL + {WEAK_UP, WEAK_DOWN} -> Trend with
    /// reduced size factor").
    pub size_factor: f64,
}

/// Free-form progress notes for logging/debugging; never consumed for
/// control flow (spec §9's sum-type redesign keeps control-relevant data in
/// typed fields of `StrategyOutput`, not here).
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub notes: Vec<String>,
}

impl Diagnostics {
    pub fn note(mut self, msg: impl Into<String>) -> Self {
        self.notes.push(msg.into());
        self
    }
}

/// What a strategy produced for one tick (spec §9: a sum type replacing the
/// original's duck-typed `{signals, metadata}` result).
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub signals: Vec<Signal>,
    pub diagnostics: Diagnostics,
    /// A ratcheted trailing-stop value the engine should write into the
    /// `PositionBook` this tick (spec §4.4), if the strategy computed one.
    /// Kept out of `Position` itself so the domain layer stays
    /// strategy-agnostic; the engine is the only writer of `Position`
    /// (spec §5 single-writer rule).
    pub stop_price_update: Option<rust_decimal::Decimal>,
}

impl StrategyOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_signal(signal: Signal) -> Self {
        Self {
            signals: vec![signal],
            ..Default::default()
        }
    }
}

/// Common interface for Trend/Range/Emergency (spec §9: trait at the seam,
/// replacing inheritance).
pub trait TradingStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_tick(&mut self, ctx: &StrategyContext) -> StrategyOutput;
}
