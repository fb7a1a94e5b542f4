//! In-memory [`ExchangeAdapter`] for tests and simulation mode (spec §6
//! `RunMode::Simulation`/`Backtest`), grounded on the teacher's
//! `MockExecutionService`: no network calls, configurable failure
//! injection, fills driven explicitly by the test rather than a real venue.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::ExchangeError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{ExchangeAdapter, PlacementAck};
use crate::domain::trading::types::{Candle, Order, OrderStatus};

/// What the next `place_order` call should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    None,
    Retryable,
    Permanent,
}

/// A venue stand-in that accepts every order instantly (unless configured
/// to fail) and never produces fills on its own — tests drive fills by
/// calling [`MockAdapter::push_order`]/mutating the stored order directly.
pub struct MockAdapter {
    orders: RwLock<HashMap<String, Order>>,
    candles: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
    balance: RwLock<Decimal>,
    next_id: AtomicU64,
    failure_mode: RwLock<FailureMode>,
    oco_supported: bool,
}

impl MockAdapter {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            candles: RwLock::new(HashMap::new()),
            balance: RwLock::new(initial_balance),
            next_id: AtomicU64::new(1),
            failure_mode: RwLock::new(FailureMode::None),
            oco_supported: false,
        }
    }

    pub fn with_oco_support(mut self, supported: bool) -> Self {
        self.oco_supported = supported;
        self
    }

    pub async fn set_failure_mode(&self, mode: FailureMode) {
        *self.failure_mode.write().await = mode;
    }

    pub async fn seed_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.candles
            .write()
            .await
            .insert((symbol.to_string(), timeframe), candles);
    }

    /// Directly mutates a stored order to simulate a fill/status update
    /// arriving from the venue, bypassing any network path.
    pub async fn mutate_order<F: FnOnce(&mut Order)>(&self, exchange_order_id: &str, f: F) {
        if let Some(order) = self.orders.write().await.get_mut(exchange_order_id) {
            f(order);
        }
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    fn exchange_id(&self) -> &str {
        "mock"
    }

    async fn place_order(&self, order: &Order) -> Result<PlacementAck, ExchangeError> {
        match *self.failure_mode.read().await {
            FailureMode::Retryable => {
                return Err(ExchangeError::retryable("MOCK_RETRYABLE", "simulated outage"))
            }
            FailureMode::Permanent => {
                return Err(ExchangeError::permanent("MOCK_PERMANENT", "simulated rejection"))
            }
            FailureMode::None => {}
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let mut stored = order.clone();
        stored.exchange_order_id = Some(id.clone());
        stored.status = OrderStatus::Placed;
        self.orders.write().await.insert(id.clone(), stored);
        Ok(PlacementAck {
            exchange_order_id: id,
        })
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), ExchangeError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(exchange_order_id) {
            Some(order) => {
                order.status = OrderStatus::Canceled;
                Ok(())
            }
            None => Err(ExchangeError::permanent(
                "UNKNOWN_ORDER",
                format!("no such order {exchange_order_id}"),
            )),
        }
    }

    async fn fetch_order(&self, exchange_order_id: &str) -> Result<Order, ExchangeError> {
        self.orders
            .read()
            .await
            .get(exchange_order_id)
            .cloned()
            .ok_or_else(|| {
                ExchangeError::permanent(
                    "UNKNOWN_ORDER",
                    format!("no such order {exchange_order_id}"),
                )
            })
    }

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, ExchangeError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| symbol.map(|s| s == o.symbol).unwrap_or(true))
            .filter(|o| {
                matches!(
                    o.status,
                    OrderStatus::Open | OrderStatus::Placed | OrderStatus::PartiallyFilled
                )
            })
            .cloned()
            .collect())
    }

    async fn fetch_balance(&self) -> Result<Decimal, ExchangeError> {
        Ok(*self.balance.read().await)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let candles = self.candles.read().await;
        let all = candles
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();
        let filtered: Vec<Candle> = all
            .into_iter()
            .filter(|c| since_ms.map(|since| c.t_open >= since).unwrap_or(true))
            .collect();
        Ok(match limit {
            Some(limit) if filtered.len() > limit => {
                filtered[filtered.len() - limit..].to_vec()
            }
            _ => filtered,
        })
    }

    fn supports_oco(&self) -> bool {
        self.oco_supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{OrderSide, OrderType, Purpose};
    use rust_decimal_macros::dec;

    fn sample_order() -> Order {
        Order {
            id: "local-1".to_string(),
            exchange_order_id: None,
            symbol: "SOL/USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: None,
            amount: dec!(10),
            filled_amount: dec!(0),
            avg_fill_price: None,
            status: OrderStatus::Open,
            created_t: 0,
            last_update_t: 0,
            stop_price: None,
            purpose: Purpose::Entry,
            strategy_tag: "test".to_string(),
            reduce_only: false,
            post_only: false,
        }
    }

    #[tokio::test]
    async fn place_order_assigns_exchange_id_and_marks_placed() {
        let adapter = MockAdapter::new(dec!(10000));
        let ack = adapter.place_order(&sample_order()).await.unwrap();
        let fetched = adapter.fetch_order(&ack.exchange_order_id).await.unwrap();
        assert_eq!(fetched.status, OrderStatus::Placed);
    }

    #[tokio::test]
    async fn place_order_respects_failure_mode() {
        let adapter = MockAdapter::new(dec!(10000));
        adapter.set_failure_mode(FailureMode::Retryable).await;
        let result = adapter.place_order(&sample_order()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().retryable);
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_permanent_error() {
        let adapter = MockAdapter::new(dec!(10000));
        let result = adapter.cancel_order("does-not-exist").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_ohlcv_respects_limit() {
        let adapter = MockAdapter::new(dec!(10000));
        let candles: Vec<Candle> = (0..5)
            .map(|i| {
                Candle::new(
                    "SOL/USDT",
                    Timeframe::OneHour,
                    i * 3_600_000,
                    dec!(100),
                    dec!(101),
                    dec!(99),
                    dec!(100),
                    dec!(10),
                )
                .unwrap()
            })
            .collect();
        adapter
            .seed_candles("SOL/USDT", Timeframe::OneHour, candles)
            .await;

        let result = adapter
            .fetch_ohlcv("SOL/USDT", Timeframe::OneHour, None, Some(2))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }
}
