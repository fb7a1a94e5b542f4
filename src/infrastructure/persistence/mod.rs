//! JSON file persistence (spec §6): one file per `(symbol, timeframe, day)`
//! for candles, one per `(symbol, day)` for orders, and a rewrite-wholesale
//! snapshot per `(symbol, day)` for metrics. Every write is atomic —
//! write-temp-then-rename — mirroring the teacher's
//! `settings_persistence`/`optimal_parameters_persistence` pattern. Symbols
//! containing `/` are encoded via `symbol_path_segment` (spec §6).

mod lock;

use crate::domain::errors::DataError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::repositories::{CandleRepository, MetricsRepository, OrderRepository};
use crate::domain::trading::types::{symbol_path_segment, Candle, Order};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub use lock::DirectoryLock;

/// Root of the `data/` tree, backing all three repository traits.
#[derive(Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candles_path(&self, symbol: &str, timeframe: Timeframe, day: NaiveDate) -> PathBuf {
        self.root
            .join("candles")
            .join(symbol_path_segment(symbol))
            .join(format!(
                "{}_{}.json",
                timeframe.file_tag(),
                day.format("%Y%m%d")
            ))
    }

    fn orders_path(&self, symbol: &str, day: NaiveDate) -> PathBuf {
        self.root
            .join("orders")
            .join(symbol_path_segment(symbol))
            .join(format!("orders_{}.json", day.format("%Y%m%d")))
    }

    fn metrics_path(&self, symbol: &str, day: NaiveDate) -> PathBuf {
        self.root
            .join("metrics")
            .join(symbol_path_segment(symbol))
            .join(format!("metrics_{}.json", day.format("%Y%m%d")))
    }
}

/// Atomically writes `content` to `path`, creating parent directories as
/// needed. Write-temp-then-rename so a crash mid-write never leaves a
/// partially-written file where a reader expects a complete one.
fn atomic_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, content)
        .with_context(|| format!("writing temp file {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

fn read_json_vec<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| {
        DataError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl CandleRepository for JsonFileStore {
    async fn append(&self, symbol: &str, timeframe: Timeframe, candle: &Candle) -> Result<()> {
        let day = chrono::DateTime::from_timestamp_millis(candle.t_open)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| DataError::Malformed {
                path: symbol.to_string(),
                reason: format!("invalid t_open {}", candle.t_open),
            })?;
        let path = self.candles_path(symbol, timeframe, day);
        let mut candles: Vec<Candle> = read_json_vec(&path)?;

        if let Some(last) = candles.last() {
            if candle.t_open <= last.t_open {
                return Err(DataError::Stale {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                    t_open: candle.t_open,
                    last_seen: last.t_open,
                }
                .into());
            }
        }
        candles.push(candle.clone());
        let content = serde_json::to_string_pretty(&candles)?;
        atomic_write(&path, &content)
    }

    async fn load_day(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        day: NaiveDate,
    ) -> Result<Vec<Candle>> {
        read_json_vec(&self.candles_path(symbol, timeframe, day))
    }

    async fn load_recent(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let mut out: Vec<Candle> = Vec::new();
        let mut cursor = day;
        // Walk backward one day-file at a time until `limit` candles are
        // collected or a month of empty files has been scanned (warm-up
        // bound — a live venue always has recent history).
        for _ in 0..31 {
            let mut day_candles = self.load_day(symbol, timeframe, cursor).await?;
            day_candles.append(&mut out);
            out = day_candles;
            if out.len() >= limit {
                break;
            }
            cursor = match cursor.pred_opt() {
                Some(prev) => prev,
                None => break,
            };
        }
        if out.len() > limit {
            out = out.split_off(out.len() - limit);
        }
        Ok(out)
    }
}

#[async_trait]
impl OrderRepository for JsonFileStore {
    async fn save(&self, symbol: &str, day: NaiveDate, order: &Order) -> Result<()> {
        let path = self.orders_path(symbol, day);
        let mut orders: Vec<Order> = read_json_vec(&path)?;
        if let Some(existing) = orders.iter_mut().find(|o| o.id == order.id) {
            *existing = order.clone();
        } else {
            orders.push(order.clone());
        }
        let content = serde_json::to_string_pretty(&orders)?;
        atomic_write(&path, &content)
    }

    async fn load_day(&self, symbol: &str, day: NaiveDate) -> Result<Vec<Order>> {
        read_json_vec(&self.orders_path(symbol, day))
    }

    async fn find_open(&self, symbol: &str, day: NaiveDate) -> Result<Vec<Order>> {
        use crate::domain::trading::types::OrderStatus;

        let orders = self.load_day(symbol, day).await?;
        Ok(orders
            .into_iter()
            .filter(|o| {
                matches!(
                    o.status,
                    OrderStatus::Open | OrderStatus::Placed | OrderStatus::PartiallyFilled
                )
            })
            .collect())
    }
}

#[async_trait]
impl MetricsRepository for JsonFileStore {
    async fn save_snapshot(
        &self,
        symbol: &str,
        day: NaiveDate,
        snapshot: &serde_json::Value,
    ) -> Result<()> {
        let path = self.metrics_path(symbol, day);
        let content = serde_json::to_string_pretty(snapshot)?;
        atomic_write(&path, &content)
    }

    async fn load_snapshot(
        &self,
        symbol: &str,
        day: NaiveDate,
    ) -> Result<Option<serde_json::Value>> {
        let path = self.metrics_path(symbol, day);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
