//! `OrderWatcherTask` (spec §4 fill ingestion, §5): periodically re-fetches
//! each order the OMS supervisor has told it to watch and synthesizes a
//! `Fill` event whenever `filled_amount` has grown since the last poll
//! (push/webhook fill delivery is out of scope for this core — spec §1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::ports::ExchangeAdapter;
use crate::domain::trading::types::{Fill, OrderStatus};

use super::oms_supervisor::OmsCommand;

/// Registers an order the supervisor just placed, mapping its venue id
/// back to the internal order id the rest of the system uses.
pub struct WatchEntry {
    pub internal_id: String,
    pub exchange_order_id: String,
    pub symbol: String,
}

struct Watched {
    internal_id: String,
    symbol: String,
    last_filled: rust_decimal::Decimal,
}

pub struct OrderWatcherTask {
    adapter: Arc<dyn ExchangeAdapter>,
    watch_rx: mpsc::Receiver<WatchEntry>,
    oms_tx: mpsc::Sender<OmsCommand>,
    interval: Duration,
}

impl OrderWatcherTask {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        watch_rx: mpsc::Receiver<WatchEntry>,
        oms_tx: mpsc::Sender<OmsCommand>,
        interval: Duration,
    ) -> Self {
        Self {
            adapter,
            watch_rx,
            oms_tx,
            interval,
        }
    }

    pub async fn run(mut self) {
        let mut watched: HashMap<String, Watched> = HashMap::new();
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                entry = self.watch_rx.recv() => {
                    match entry {
                        Some(entry) => {
                            watched.insert(
                                entry.exchange_order_id.clone(),
                                Watched {
                                    internal_id: entry.internal_id,
                                    symbol: entry.symbol,
                                    last_filled: rust_decimal::Decimal::ZERO,
                                },
                            );
                        }
                        None => return, // supervisor gone, nothing left to watch for
                    }
                }
                _ = ticker.tick() => {
                    self.poll_once(&mut watched).await;
                }
            }
        }
    }

    async fn poll_once(&self, watched: &mut HashMap<String, Watched>) {
        let mut terminal = Vec::new();

        for (exchange_order_id, entry) in watched.iter_mut() {
            let remote = match self.adapter.fetch_order(exchange_order_id).await {
                Ok(order) => order,
                Err(e) => {
                    warn!(exchange_order_id = %exchange_order_id, error = %e, "order watcher poll failed");
                    continue;
                }
            };

            let delta = remote.filled_amount - entry.last_filled;
            if delta > rust_decimal::Decimal::ZERO {
                let fill = Fill {
                    order_id: entry.internal_id.clone(),
                    exchange_order_id: Some(exchange_order_id.clone()),
                    // Cumulative filled amount is a stable, idempotent trade
                    // id for a polling source that has no native trade id
                    // stream: redelivering the same poll result produces the
                    // same key and is deduplicated by the OMS.
                    exchange_trade_id: format!("watch-{exchange_order_id}-{}", remote.filled_amount),
                    symbol: entry.symbol.clone(),
                    side: remote.side,
                    amount: delta,
                    price: remote.avg_fill_price.or(remote.price).unwrap_or_default(),
                    t: Utc::now().timestamp_millis(),
                    fee: None,
                };
                entry.last_filled = remote.filled_amount;
                if self.oms_tx.send(OmsCommand::Fill(fill)).await.is_err() {
                    return;
                }
            }

            if matches!(
                remote.status,
                OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
            ) {
                terminal.push(exchange_order_id.clone());
            }
        }

        for id in terminal {
            watched.remove(&id);
        }
    }
}
