//! Single-writer OMS task (spec §5): the sole consumer of `OmsTask`/
//! `OrderBook`, driven by an [`OmsCommand`] channel. After every mutation it
//! republishes a snapshot of the canonical `PositionBook` (owned inside
//! `OrderBook`) into the shared `Arc<RwLock<PositionBook>>` the engine reads
//! from, and folds realised PnL into the shared `Account`.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};

use crate::application::oms::OmsTask;
use crate::domain::repositories::OrderRepository;
use crate::domain::trading::position_book::{FillOutcome, PositionBook};
use crate::domain::trading::types::{Account, Fill, Purpose, Signal, SystemMode};

use super::order_watcher::WatchEntry;

/// What the supervisor is told to do; the single place new `Signal`s,
/// synthetic `Fill`s, mode-transition side effects, and shutdown all funnel
/// through (spec §5 single-writer rule).
pub enum OmsCommand {
    Signal(Signal),
    Fill(Fill),
    /// A mode transition that blocks entries just occurred — cancel every
    /// still-open ENTRY/ADDON order (spec §5: "writes serialised through a
    /// mode-transition channel that also emits the side effects").
    CancelOpenEntries,
    /// The engine ratcheted a trailing stop (spec §4.4) and needs it
    /// written into the `PositionBook` the OMS exclusively owns (spec §5
    /// single-writer rule).
    UpdateStop {
        symbol: String,
        stop_price: rust_decimal::Decimal,
    },
    /// This tick's close, so the OMS can mark its `PositionBook` to market
    /// and refresh `Account::unrealized_pnl` (spec §4.8, §9 decision (b)),
    /// even on ticks that produce no signal or stop update.
    MarkPrice {
        symbol: String,
        price: rust_decimal::Decimal,
    },
    /// Graceful shutdown: flatten every tracked position with reduce-only
    /// exits, then acknowledge.
    CloseAll(oneshot::Sender<()>),
}

pub struct OmsSupervisor {
    oms: OmsTask,
    cmd_rx: mpsc::Receiver<OmsCommand>,
    positions: Arc<RwLock<PositionBook>>,
    account: Arc<RwLock<Account>>,
    mode: Arc<RwLock<SystemMode>>,
    order_repository: Arc<dyn OrderRepository>,
    watch_tx: mpsc::Sender<WatchEntry>,
}

impl OmsSupervisor {
    pub fn new(
        oms: OmsTask,
        cmd_rx: mpsc::Receiver<OmsCommand>,
        positions: Arc<RwLock<PositionBook>>,
        account: Arc<RwLock<Account>>,
        mode: Arc<RwLock<SystemMode>>,
        order_repository: Arc<dyn OrderRepository>,
        watch_tx: mpsc::Sender<WatchEntry>,
    ) -> Self {
        Self {
            oms,
            cmd_rx,
            positions,
            account,
            mode,
            order_repository,
            watch_tx,
        }
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                OmsCommand::Signal(signal) => self.handle_signal(signal).await,
                OmsCommand::Fill(fill) => self.handle_fill(fill).await,
                OmsCommand::CancelOpenEntries => self.handle_cancel_open_entries().await,
                OmsCommand::UpdateStop { symbol, stop_price } => {
                    self.handle_update_stop(&symbol, stop_price).await
                }
                OmsCommand::MarkPrice { symbol, price } => self.handle_mark_price(&symbol, price).await,
                OmsCommand::CloseAll(ack) => {
                    self.handle_close_all().await;
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        if matches!(signal.purpose, Purpose::Entry | Purpose::Addon) && self.mode.read().await.blocks_entries() {
            warn!(symbol = %signal.symbol, purpose = ?signal.purpose, "dropping signal: mode blocks entries");
            return;
        }

        let now = Utc::now().timestamp_millis();
        match self.oms.place_signal(signal, now).await {
            Ok(order) => {
                self.persist_order(&order).await;
                if let Some(exchange_order_id) = order.exchange_order_id.clone() {
                    let entry = WatchEntry {
                        internal_id: order.id.clone(),
                        exchange_order_id,
                        symbol: order.symbol.clone(),
                    };
                    let _ = self.watch_tx.send(entry).await;
                }
                self.sync_positions().await;
            }
            Err(e) => error!(error = %e, "order placement failed"),
        }
    }

    async fn handle_fill(&mut self, fill: Fill) {
        use crate::application::oms::FillApplication;

        let order_id = fill.order_id.clone();
        match self.oms.apply_fill(fill).await {
            Ok(FillApplication::Duplicate) => {
                info!(order_id = %order_id, "duplicate fill ignored");
            }
            Ok(FillApplication::Applied { position_outcome, .. }) => {
                if let Some(order) = self.oms.book().get(&order_id) {
                    self.persist_order(&order.clone()).await;
                }
                self.apply_realized_pnl(&position_outcome).await;
                self.sync_positions().await;
            }
            Err(e) => error!(order_id = %order_id, error = %e, "failed to apply fill"),
        }
    }

    async fn handle_cancel_open_entries(&mut self) {
        let now = Utc::now().timestamp_millis();
        let ids: Vec<String> = self
            .oms
            .book()
            .open_orders()
            .filter(|o| matches!(o.purpose, Purpose::Entry | Purpose::Addon))
            .map(|o| o.id.clone())
            .collect();
        for id in ids {
            if let Err(e) = self.oms.cancel_order(&id, now).await {
                error!(order_id = %id, error = %e, "failed to cancel entry order on mode transition");
            }
        }
    }

    async fn handle_update_stop(&mut self, symbol: &str, stop_price: rust_decimal::Decimal) {
        self.oms.update_stop(symbol, stop_price);
        self.sync_positions().await;
    }

    async fn handle_mark_price(&mut self, symbol: &str, price: rust_decimal::Decimal) {
        self.oms.mark_price(symbol, price);
        self.sync_positions().await;
    }

    async fn handle_close_all(&mut self) {
        let now = Utc::now().timestamp_millis();
        for result in self.oms.close_all_positions(now).await {
            match result {
                Ok(order) => self.persist_order(&order).await,
                Err(e) => error!(error = %e, "failed to place shutdown exit order"),
            }
        }
        self.sync_positions().await;
    }

    /// Republishes the `PositionBook` snapshot the engine reads from and
    /// re-marks `Account::unrealized_pnl` off it, so `daily_pnl_pct` (spec
    /// §9 decision (b): realised + unrealised change since midnight) stays
    /// current every time a fill or stop update moves the book.
    async fn sync_positions(&self) {
        let snapshot = self.oms.book().positions().clone();
        let total_unrealized: rust_decimal::Decimal =
            snapshot.all().map(|p| p.unrealized_pnl()).sum();
        let open_positions: Vec<_> = snapshot.all().cloned().collect();
        *self.positions.write().await = snapshot;
        let mut account = self.account.write().await;
        account.unrealized_pnl = total_unrealized;
        // Keeps `Account.positions` (spec §3's `positions[]`) current so the
        // risk filter can see cumulative exposure per symbol (spec §4.6).
        account.positions = open_positions;
    }

    async fn persist_order(&self, order: &crate::domain::trading::types::Order) {
        let day = chrono::DateTime::from_timestamp_millis(order.last_update_t)
            .map(|dt| dt.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive());
        if let Err(e) = self.order_repository.save(&order.symbol, day, order).await {
            error!(order_id = %order.id, error = %e, "failed to persist order");
        }
    }

    async fn apply_realized_pnl(&self, outcome: &FillOutcome) {
        let realized = match outcome {
            FillOutcome::Reduced { realized_pnl } => Some(*realized_pnl),
            FillOutcome::Closed { realized_pnl } => Some(*realized_pnl),
            FillOutcome::ClosedThenReopened { realized_pnl, .. } => Some(*realized_pnl),
            FillOutcome::Opened | FillOutcome::Increased => None,
        };
        if let Some(realized) = realized {
            let mut account = self.account.write().await;
            account.balance += realized;
            account.available += realized;
            account.daily_pnl += realized;
        }
    }
}
