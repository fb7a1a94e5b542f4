//! Repository Pattern Abstractions
//!
//! Traits for data persistence, separating business logic from storage.
//! `infrastructure::persistence` backs these with one JSON file per day,
//! written atomically (write-temp + rename) under `data/` (spec §6).

use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::types::{Candle, Order};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Candles for one `(symbol, timeframe, day)` live in a single file
/// (`candles/<SYMBOL>/<TF>_<YYYYMMDD>.json`).
#[async_trait]
pub trait CandleRepository: Send + Sync {
    async fn append(&self, symbol: &str, timeframe: Timeframe, candle: &Candle) -> Result<()>;

    async fn load_day(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        day: NaiveDate,
    ) -> Result<Vec<Candle>>;

    /// Loads the most recent `limit` candles ending at or before `day`,
    /// spanning as many day-files back as needed — used for warm-up.
    async fn load_recent(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}

/// Orders for one `(symbol, day)` live in a single file
/// (`orders/<SYMBOL>/orders_<YYYYMMDD>.json`). The OMS is the sole writer.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, symbol: &str, day: NaiveDate, order: &Order) -> Result<()>;

    async fn load_day(&self, symbol: &str, day: NaiveDate) -> Result<Vec<Order>>;

    async fn find_open(&self, symbol: &str, day: NaiveDate) -> Result<Vec<Order>>;
}

/// A single day's metrics snapshot
/// (`metrics/<SYMBOL>/metrics_<YYYYMMDD>.json`), rewritten wholesale on
/// every update rather than appended.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn save_snapshot(
        &self,
        symbol: &str,
        day: NaiveDate,
        snapshot: &serde_json::Value,
    ) -> Result<()>;

    async fn load_snapshot(
        &self,
        symbol: &str,
        day: NaiveDate,
    ) -> Result<Option<serde_json::Value>>;
}
