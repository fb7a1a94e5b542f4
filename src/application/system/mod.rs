//! `Application::start` (spec §5, SPEC_FULL SUPPLEMENT-3): spawns the
//! concurrency scaffolding around the pure `EngineCore`/`OrderBook` pair and
//! returns an [`EngineHandle`], mirroring the teacher's
//! `application/system/mod.rs` two-phase `build`/`start` split and its
//! `SystemHandle`.

mod oms_supervisor;
mod order_watcher;
mod shutdown;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info};

use crate::application::bootstrap::Application;
use crate::application::engine::{EngineCore, EngineEvent, EngineTask};
use crate::application::oms::OmsTask;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::position_book::PositionBook;
use crate::domain::trading::types::{Account, Candle, SystemMode};

pub use oms_supervisor::{OmsCommand, OmsSupervisor};
pub use order_watcher::OrderWatcherTask;
pub use shutdown::ShutdownService;

/// Default poll interval for [`OrderWatcherTask`] on orders already being
/// tracked (spec §4's "every 30s for recently placed"). The slower
/// "every 5 minutes" cadence for older open orders is left to a future
/// two-speed watcher; a single interval is a safe, spec-compliant subset.
const ORDER_WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// How often the market-data poller asks the exchange adapter for fresh
/// candles, per symbol/timeframe pair, when no push feed is wired (spec §1
/// non-goal: websocket streaming is out of scope for this core).
const CANDLE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Bound on every inter-task channel (spec §5: "bounded mpsc channels").
const CHANNEL_CAPACITY: usize = 256;

/// Command/sender surface returned by `Application::start`, mirroring the
/// teacher's `SystemHandle`.
pub struct EngineHandle {
    pub oms_tx: mpsc::Sender<OmsCommand>,
    pub mode: Arc<RwLock<SystemMode>>,
    pub shutdown: ShutdownService,
}

impl Application {
    /// Spawns `EngineTask`, the OMS supervisor, the order watcher, the
    /// candle poller, and the midnight timer, then returns a handle with
    /// the senders needed to drive or shut the system down (spec §5).
    pub async fn start(self) -> Result<EngineHandle> {
        let exchange_id = self.adapter.exchange_id().to_string();
        let mode: Arc<RwLock<SystemMode>> = Arc::new(RwLock::new(SystemMode::Normal));

        let (candle_tx, candle_rx) = mpsc::channel::<Candle>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(CHANNEL_CAPACITY);
        let (oms_tx, oms_rx) = mpsc::channel::<OmsCommand>(CHANNEL_CAPACITY);
        let (watch_tx, watch_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let engine_core = EngineCore::new(
            self.config.market.clone(),
            self.config.trend.clone(),
            self.config.range.clone(),
            self.config.risk.clone(),
        );
        let engine_task = EngineTask::new(
            engine_core,
            self.positions.clone(),
            self.account.clone(),
            mode.clone(),
            candle_rx,
            event_tx,
            exchange_id.clone(),
        );
        tokio::spawn(engine_task.run());
        tokio::spawn(forward_events_to_oms(event_rx, oms_tx.clone()));

        let oms = OmsTask::new(exchange_id.clone(), self.adapter.clone());
        let supervisor = OmsSupervisor::new(
            oms,
            oms_rx,
            self.positions.clone(),
            self.account.clone(),
            mode.clone(),
            self.order_repository.clone(),
            watch_tx,
        );
        tokio::spawn(supervisor.run());

        let watcher = OrderWatcherTask::new(
            self.adapter.clone(),
            watch_rx,
            oms_tx.clone(),
            ORDER_WATCH_INTERVAL,
        );
        tokio::spawn(watcher.run());

        tokio::spawn(candle_poller(
            self.adapter.clone(),
            self.config.symbols.clone(),
            self.config.timeframes.clone(),
            candle_tx,
            CANDLE_POLL_INTERVAL,
        ));

        tokio::spawn(midnight_timer(self.account.clone()));

        let shutdown = ShutdownService::new(oms_tx.clone());

        Ok(EngineHandle {
            oms_tx,
            mode,
            shutdown,
        })
    }
}

/// Bridges the engine's `EngineEvent` stream onto the OMS command channel.
/// Kept as a tiny standalone forwarder (rather than having `EngineTask`
/// depend on the OMS command enum directly) so `EngineCore`/`EngineTask`
/// stay ignorant of OMS-internal concerns.
async fn forward_events_to_oms(mut event_rx: mpsc::Receiver<EngineEvent>, oms_tx: mpsc::Sender<OmsCommand>) {
    while let Some(event) = event_rx.recv().await {
        let command = match event {
            EngineEvent::Signal(signal) => OmsCommand::Signal(signal),
            EngineEvent::StopPriceUpdate { symbol, stop_price } => {
                OmsCommand::UpdateStop { symbol, stop_price }
            }
            EngineEvent::PriceUpdate { symbol, price } => OmsCommand::MarkPrice { symbol, price },
            EngineEvent::CancelOpenEntries => OmsCommand::CancelOpenEntries,
        };
        if oms_tx.send(command).await.is_err() {
            return;
        }
    }
}

/// Polls each configured `(symbol, timeframe)` pair for new candles and
/// forwards them to the engine (spec §1 non-goal: no websocket stream in
/// this core, so REST polling is the only ingestion path).
async fn candle_poller(
    adapter: Arc<dyn crate::domain::ports::ExchangeAdapter>,
    symbols: Vec<String>,
    timeframes: Vec<Timeframe>,
    candle_tx: mpsc::Sender<Candle>,
    interval: Duration,
) {
    let mut last_seen: HashMap<(String, Timeframe), i64> = HashMap::new();
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for symbol in &symbols {
            for &timeframe in &timeframes {
                let since = last_seen.get(&(symbol.clone(), timeframe)).copied();
                match adapter.fetch_ohlcv(symbol, timeframe, since, Some(2)).await {
                    Ok(candles) => {
                        for candle in candles {
                            last_seen.insert((symbol.clone(), timeframe), candle.t_open);
                            if candle_tx.send(candle).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!(symbol = %symbol, ?timeframe, error = %e, "candle poll failed");
                    }
                }
            }
        }
    }
}

/// Sleeps until the next UTC midnight and rolls the account's daily-PnL
/// anchor forward (spec §4.8 day rollover), repeating forever.
async fn midnight_timer(account: Arc<RwLock<Account>>) {
    loop {
        let now = Utc::now();
        let next_midnight = (now.date_naive() + chrono::Days::new(1))
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc();
        let sleep_for = (next_midnight - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        tokio::time::sleep(sleep_for).await;

        let tick_day = Utc::now().timestamp_millis().div_euclid(86_400_000);
        let mut guard = account.write().await;
        let equity = guard.balance + guard.unrealized_pnl;
        if guard.maybe_roll_midnight(tick_day, equity) {
            info!(day = tick_day, "midnight rollover: daily PnL anchor reset");
        }
    }
}

/// Oneshot acknowledgement type shared by [`OmsCommand::CloseAll`] and the
/// shutdown sequence.
pub type Ack = oneshot::Sender<()>;
