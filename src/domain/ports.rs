//! `ExchangeAdapter`: the common operation set every venue is wrapped
//! behind (spec §4.9). Capability negotiation (`supports_oco`) is an
//! explicit method, not duck-typed property probing.

use crate::domain::errors::ExchangeError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::types::{Candle, Order};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// What the venue handed back after accepting an order.
#[derive(Debug, Clone)]
pub struct PlacementAck {
    pub exchange_order_id: String,
}

#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange_id(&self) -> &str;

    /// MARKET orders are sent without a `price` field. Symbols are passed
    /// in the venue's native format — the adapter is responsible for the
    /// mapping, the caller always deals in normalised symbols.
    async fn place_order(&self, order: &Order) -> Result<PlacementAck, ExchangeError>;

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), ExchangeError>;

    async fn fetch_order(&self, exchange_order_id: &str) -> Result<Order, ExchangeError>;

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, ExchangeError>;

    async fn fetch_balance(&self) -> Result<Decimal, ExchangeError>;

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Whether this venue supports native one-cancels-other orders. When
    /// `false`, the OMS emulates OCO by tracking the sibling itself
    /// (spec §4.7).
    fn supports_oco(&self) -> bool;
}
