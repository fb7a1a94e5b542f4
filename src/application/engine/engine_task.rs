//! EngineCore (spec §4.11): the synchronous per-candle pipeline —
//! indicators -> regime -> mode dispatch -> strategy -> risk filter — kept
//! free of tokio so it can be driven deterministically in tests, the same
//! split used by [`crate::application::oms::order_book::OrderBook`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument};

use crate::domain::config::{MarketConfig, RangeConfig, RiskConfig, TrendConfig};
use crate::domain::market::indicators::IndicatorState;
use crate::domain::market::regime::{daily_move_pct, RegimeClassifier, RegimeClassifierConfig};
use crate::domain::trading::position_book::PositionBook;
use crate::domain::trading::types::{Account, Candle, Signal, SystemMode};

use crate::application::risk::{RiskContext, RiskFilter};
use crate::application::strategies::dispatcher::{DispatcherConfig, SelectedStrategy, StrategyDispatcher};
use crate::application::strategies::emergency::EmergencyStrategy;
use crate::application::strategies::range::RangeStrategy;
use crate::application::strategies::trend::TrendStrategy;
use crate::application::strategies::{Diagnostics, StrategyContext, StrategyOutput, TradingStrategy};

const MS_PER_DAY: i64 = 86_400_000;

/// What a tick produced: the risk-approved signals, a stop-price update (if
/// any) the caller must persist into the `PositionBook`, and the mode the
/// dispatcher settled on for observability.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub signals: Vec<Signal>,
    pub stop_price_update: Option<rust_decimal::Decimal>,
    pub mode: Option<SystemMode>,
    pub diagnostics: Diagnostics,
    /// This tick's close, so the caller can mark the position book to
    /// market (spec §4.8 `unrealized_pnl`) even on ticks with no signal.
    pub current_price: Option<rust_decimal::Decimal>,
}

struct SymbolState {
    indicators: IndicatorState,
    last_daily_close: Option<f64>,
    current_day: i64,
}

pub struct EngineCore {
    market_config: MarketConfig,
    regime_classifier: RegimeClassifier,
    dispatcher: StrategyDispatcher,
    risk_filter: RiskFilter,

    trend: TrendStrategy,
    range: RangeStrategy,
    emergency: EmergencyStrategy,

    symbols: HashMap<String, SymbolState>,
}

impl EngineCore {
    pub fn new(
        market: MarketConfig,
        trend: TrendConfig,
        range: RangeConfig,
        risk: RiskConfig,
    ) -> Self {
        let dispatcher_config = DispatcherConfig {
            black_swan_threshold: risk.emergency_gap_threshold,
            recovery_threshold: risk.emergency_recovery_threshold,
            recovery_hours: risk.emergency_recovery_hours,
            max_daily_loss: risk.max_daily_loss,
        };
        Self {
            trend: TrendStrategy::new(trend),
            range: RangeStrategy::new(range),
            emergency: EmergencyStrategy::new(),
            risk_filter: RiskFilter::new(risk),
            dispatcher: StrategyDispatcher::new(dispatcher_config),
            regime_classifier: RegimeClassifier::new(RegimeClassifierConfig {
                atr_percentage_threshold: market.atr_percentage_threshold,
                ..RegimeClassifierConfig::default()
            }),
            market_config: market,
            symbols: HashMap::new(),
        }
    }

    pub fn mode(&self) -> SystemMode {
        self.dispatcher.mode()
    }

    fn symbol_state(&mut self, symbol: &str) -> &mut SymbolState {
        self.symbols.entry(symbol.to_string()).or_insert_with(|| SymbolState {
            indicators: IndicatorState::new(
                symbol.to_string(),
                self.market_config.short_term_ema,
                self.market_config.long_term_ema,
                self.market_config.atr_period,
                self.market_config.adx_period,
                self.market_config.donchian_period,
            ),
            last_daily_close: None,
            current_day: i64::MIN,
        })
    }

    /// Runs the full pipeline for one candle (spec §4.11): update
    /// indicators, classify regime, evaluate the mode transition table
    /// (including the black-swan sentinel), dispatch to the selected
    /// strategy, then risk-filter its signals.
    #[instrument(skip(self, candle, account, position), fields(symbol = %candle.symbol))]
    pub fn on_candle(
        &mut self,
        candle: Candle,
        account: &Account,
        position: Option<&crate::domain::trading::position_book::Position>,
    ) -> TickOutcome {
        let symbol = candle.symbol.clone();
        let close = to_f64(candle.close);
        let t_ms = candle.t_open;
        let day_index = t_ms.div_euclid(MS_PER_DAY);

        let state = self.symbol_state(&symbol);
        let rolled_day = day_index > state.current_day;
        let previous_daily_close = state.last_daily_close;
        if rolled_day {
            state.current_day = day_index;
        }
        state.indicators.update(candle.clone());
        let regime = self.regime_classifier.classify(&mut state.indicators);

        let black_swan_move = previous_daily_close
            .map(|prev| daily_move_pct(prev, close))
            .unwrap_or(0.0);
        let daily_pnl_pct = to_f64(account.daily_pnl_pct());

        self.dispatcher
            .on_tick(black_swan_move, t_ms, day_index, daily_pnl_pct);

        if rolled_day {
            let state = self.symbol_state(&symbol);
            state.last_daily_close = Some(close);
        }

        let selected = self.dispatcher.select(regime.regime);
        debug!(mode = %self.dispatcher.mode(), regime = ?regime.regime, selected = ?selected, "tick dispatched");

        let size_factor = match selected {
            SelectedStrategy::TrendReduced => 0.5,
            _ => 1.0,
        };

        let state = self.symbols.get(&symbol).expect("seeded above");
        let ctx = StrategyContext {
            candle: &candle,
            indicators: &state.indicators,
            regime,
            position,
            account,
            size_factor,
        };

        let output: StrategyOutput = match selected {
            SelectedStrategy::Trend | SelectedStrategy::TrendReduced => self.trend.on_tick(&ctx),
            SelectedStrategy::Range => self.range.on_tick(&ctx),
            SelectedStrategy::Emergency => self.emergency.on_tick(&ctx),
            SelectedStrategy::None => StrategyOutput::empty(),
        };

        let risk_ctx = RiskContext {
            mode: self.dispatcher.mode(),
            account,
            current_price: candle_close_decimal(close),
        };
        let approved = self.risk_filter.apply(output.signals, &risk_ctx);

        TickOutcome {
            signals: approved,
            stop_price_update: output.stop_price_update,
            mode: Some(self.dispatcher.mode()),
            diagnostics: output.diagnostics,
            current_price: Some(candle_close_decimal(close)),
        }
    }
}

fn to_f64(d: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

fn candle_close_decimal(close: f64) -> rust_decimal::Decimal {
    rust_decimal::Decimal::try_from(close).unwrap_or_default()
}

/// Everything `EngineTask` hands to the OMS side: risk-approved signals,
/// stop-price ratchets the OMS must write into the `PositionBook` it owns,
/// and the mode-transition side effect of cancelling resting entries (spec
/// §5: "writes serialised through a mode-transition channel that also
/// emits the side effects (cancel open entries on STANDBY, etc.)").
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Signal(Signal),
    StopPriceUpdate {
        symbol: String,
        stop_price: rust_decimal::Decimal,
    },
    /// This tick's close, for the OMS to mark the position book to market
    /// (spec §4.8 `unrealized_pnl`) — sent every tick, not only on signals.
    PriceUpdate {
        symbol: String,
        price: rust_decimal::Decimal,
    },
    CancelOpenEntries,
}

/// Async wrapper consuming candles from a channel and forwarding
/// risk-approved signals to the OMS, sharing the `PositionBook`/`Account`
/// the OMS owns behind a read lock (spec §5 single-writer rule: only the
/// OMS task ever takes the write lock).
pub struct EngineTask {
    core: EngineCore,
    positions: Arc<RwLock<PositionBook>>,
    account: Arc<RwLock<Account>>,
    /// Atomically-readable system mode (spec §5: "atomically readable
    /// anywhere; writes serialised through a mode-transition channel").
    /// The engine is the sole writer; the OMS supervisor only reads it to
    /// decide whether a transition's side effects (cancel open entries)
    /// must fire.
    mode: Arc<RwLock<SystemMode>>,
    candle_rx: mpsc::Receiver<Candle>,
    event_tx: mpsc::Sender<EngineEvent>,
    exchange_id: String,
    last_mode: SystemMode,
}

impl EngineTask {
    pub fn new(
        core: EngineCore,
        positions: Arc<RwLock<PositionBook>>,
        account: Arc<RwLock<Account>>,
        mode: Arc<RwLock<SystemMode>>,
        candle_rx: mpsc::Receiver<Candle>,
        event_tx: mpsc::Sender<EngineEvent>,
        exchange_id: impl Into<String>,
    ) -> Self {
        Self {
            core,
            positions,
            account,
            mode,
            candle_rx,
            event_tx,
            exchange_id: exchange_id.into(),
            last_mode: SystemMode::Normal,
        }
    }

    pub async fn run(mut self) {
        while let Some(candle) = self.candle_rx.recv().await {
            let symbol = candle.symbol.clone();
            let mut account = self.account.read().await.clone();
            let positions = self.positions.read().await;
            let position = positions.get(&symbol, &self.exchange_id).cloned();
            // `OmsSupervisor::sync_positions` keeps the shared `Account` up to
            // date too, but re-stamp here from the just-read snapshot so a
            // stale clone never reaches the risk filter's notional cap.
            account.positions = positions.all().cloned().collect();
            drop(positions);

            let outcome = self.core.on_candle(candle, &account, position.as_ref());
            if let Some(price) = outcome.current_price {
                let event = EngineEvent::PriceUpdate {
                    symbol: symbol.clone(),
                    price,
                };
                if self.event_tx.send(event).await.is_err() {
                    return;
                }
            }
            if let Some(mode) = outcome.mode {
                info!(%mode, symbol = %symbol, "engine tick");
                *self.mode.write().await = mode;
                if mode.blocks_entries() && !self.last_mode.blocks_entries() {
                    if self.event_tx.send(EngineEvent::CancelOpenEntries).await.is_err() {
                        return;
                    }
                }
                self.last_mode = mode;
            }
            if let Some(stop_price) = outcome.stop_price_update {
                let event = EngineEvent::StopPriceUpdate {
                    symbol: symbol.clone(),
                    stop_price,
                };
                if self.event_tx.send(event).await.is_err() {
                    return;
                }
            }
            for signal in outcome.signals {
                if self.event_tx.send(EngineEvent::Signal(signal)).await.is_err() {
                    return; // OMS side shut down
                }
            }
        }
    }
}
