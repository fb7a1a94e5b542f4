//! OmsTask (spec §4.7, §5): the async wrapper around [`OrderBook`] that
//! talks to an [`ExchangeAdapter`], retrying placements with the fixed
//! backoff schedule and circuit breaker the exchange layer already uses.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::errors::OmsError;
use crate::domain::ports::ExchangeAdapter;
use crate::domain::trading::types::{Fill, Order, Signal};
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};

use super::{FillApplication, OcoManager, OrderBook};

/// Exponential backoff schedule for order placement retries (spec §4.7):
/// 1s, 2s, 4s, ..., capping at 64s, for up to 7 attempts.
pub const RETRY_BACKOFF_SECONDS: [u64; 7] = [1, 2, 4, 8, 16, 32, 64];

pub struct OmsTask {
    adapter: Arc<dyn ExchangeAdapter>,
    circuit_breaker: CircuitBreaker,
    book: OrderBook,
    oco: OcoManager,
}

impl OmsTask {
    pub fn new(exchange_id: impl Into<String>, adapter: Arc<dyn ExchangeAdapter>) -> Self {
        let exchange_id = exchange_id.into();
        Self {
            circuit_breaker: CircuitBreaker::new(
                format!("oms-{exchange_id}"),
                5,
                2,
                Duration::from_secs(30),
            ),
            book: OrderBook::new(exchange_id),
            adapter,
            oco: OcoManager::new(),
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Writes an engine-computed trailing-stop ratchet into the position
    /// the OMS owns (spec §4.4/§5: the OMS is the `PositionBook`'s sole
    /// writer, so the engine can only request this through a command).
    pub fn update_stop(&mut self, symbol: &str, stop_price: rust_decimal::Decimal) {
        self.book.positions_mut().update_stop(symbol, self.book.exchange_id(), stop_price);
    }

    /// Marks a position to the latest tick's close so `unrealized_pnl`
    /// stays current between fills (spec §4.8, §9 decision (b)).
    pub fn mark_price(&mut self, symbol: &str, price: rust_decimal::Decimal) {
        let exchange_id = self.book.exchange_id().to_string();
        self.book.positions_mut().mark_price(symbol, &exchange_id, price);
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    /// Registers the order, then places it on the venue with the retry
    /// schedule in `RETRY_BACKOFF_SECONDS`, wrapped by the circuit breaker
    /// (spec §4.7).
    pub async fn place_signal(&mut self, signal: Signal, now: i64) -> Result<Order, OmsError> {
        let order = self.book.create_order(&signal, now);

        for (attempt, backoff_secs) in RETRY_BACKOFF_SECONDS.iter().enumerate() {
            let result = self
                .circuit_breaker
                .call(self.adapter.place_order(&order))
                .await;

            match result {
                Ok(ack) => {
                    self.book.mark_placed(&order.id, ack.exchange_order_id, now)?;
                    return Ok(self.book.get(&order.id).expect("just inserted").clone());
                }
                Err(CircuitBreakerError::Open(reason)) => {
                    warn!(order_id = %order.id, reason = %reason, "placement blocked by open circuit");
                    tokio::time::sleep(Duration::from_secs(*backoff_secs)).await;
                }
                Err(CircuitBreakerError::Inner(e)) if e.retryable => {
                    warn!(
                        order_id = %order.id,
                        attempt,
                        backoff_secs,
                        reason = %e.reason,
                        "retryable placement failure, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs(*backoff_secs)).await;
                }
                Err(CircuitBreakerError::Inner(e)) => {
                    error!(order_id = %order.id, reason = %e.reason, "permanent placement rejection");
                    self.book.mark_rejected(&order.id, now)?;
                    return Err(OmsError::PermanentRejected {
                        code: e.code,
                        reason: e.reason,
                    });
                }
            }
        }

        self.book.mark_rejected(&order.id, now)?;
        Err(OmsError::RetryableNetwork {
            reason: format!("exhausted {} placement retries", RETRY_BACKOFF_SECONDS.len()),
        })
    }

    /// Applies a fill observed by the order watcher, cancelling the OCO
    /// sibling when the filled order was part of a tracked pair.
    pub async fn apply_fill(&mut self, fill: Fill) -> Result<FillApplication, OmsError> {
        let order_id = fill.order_id.clone();
        let application = self.book.apply_fill(fill)?;

        if matches!(
            application,
            FillApplication::Applied {
                order_status: crate::domain::trading::types::OrderStatus::Filled,
                ..
            }
        ) {
            if let Some(sibling_id) = self.oco.on_order_terminal(&order_id) {
                if let Some(sibling) = self.book.get(&sibling_id) {
                    if let Some(exchange_order_id) = sibling.exchange_order_id.clone() {
                        let _ = self
                            .circuit_breaker
                            .call(self.adapter.cancel_order(&exchange_order_id))
                            .await;
                        info!(order_id = %sibling_id, "cancelled OCO sibling after fill");
                    }
                }
            }
        }

        Ok(application)
    }

    pub async fn cancel_order(&mut self, id: &str, now: i64) -> Result<(), OmsError> {
        if let Some(order) = self.book.get(id) {
            if let Some(exchange_order_id) = order.exchange_order_id.clone() {
                let _ = self
                    .circuit_breaker
                    .call(self.adapter.cancel_order(&exchange_order_id))
                    .await;
            }
        }
        self.book.cancel(id, now)
    }

    /// Registers a take-profit/stop-loss pair for OCO emulation (spec
    /// §4.7/§4.9), used only when `adapter.supports_oco()` is false.
    pub fn register_oco(&mut self, take_profit_order_id: String, stop_loss_order_id: String) {
        self.oco.register(take_profit_order_id, stop_loss_order_id);
    }

    /// Flattens every tracked position with reduce-only market orders (spec
    /// §5 graceful shutdown / kill switch).
    pub async fn close_all_positions(&mut self, now: i64) -> Vec<Result<Order, OmsError>> {
        let exits = self.book.close_all_positions();
        let mut results = Vec::with_capacity(exits.len());
        for exit in exits {
            results.push(self.place_signal(exit, now).await);
        }
        results
    }
}
