//! Push-based status/metrics reporter (spec §6 "Status endpoint", non-goal
//! "HTTP status API"). Periodically logs a [`StatusReport`] as structured
//! JSON — there is no server, no listener, only outbound logging.

use crate::domain::trading::position_book::PositionBook;
use crate::domain::trading::types::{Account, SystemMode};
use crate::infrastructure::observability::metrics::Metrics;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Mirrors spec §6's status value: `status`, `mode`, `dailyPnL`, `balance`,
/// `positions[]`. `daily_pnl` is `account.total_daily_pnl()` (realised plus
/// unrealised, spec §9 decision (b)) and is exactly `0` immediately after
/// `Application::build`, before any candle has been processed.
#[derive(Serialize)]
pub struct StatusReport {
    pub status: String,
    pub mode: String,
    #[serde(rename = "dailyPnL")]
    pub daily_pnl: f64,
    pub balance: f64,
    pub positions: Vec<PositionSnapshot>,
}

#[derive(Serialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: String,
    pub amount: f64,
    pub avg_entry_price: f64,
    pub unrealized_pnl: f64,
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

impl StatusReport {
    pub fn build(mode: SystemMode, account: &Account, positions: &PositionBook) -> Self {
        Self {
            status: "ok".to_string(),
            mode: mode.to_string(),
            daily_pnl: to_f64(account.total_daily_pnl()),
            balance: to_f64(account.balance),
            positions: positions
                .all()
                .map(|p| PositionSnapshot {
                    symbol: p.symbol.clone(),
                    side: p.side.to_string(),
                    amount: to_f64(p.amount),
                    avg_entry_price: to_f64(p.avg_entry_price),
                    unrealized_pnl: to_f64(p.unrealized_pnl()),
                })
                .collect(),
        }
    }
}

/// Periodically logs a [`StatusReport`] as JSON and mirrors it into
/// [`Metrics`]. No HTTP server or incoming connections — only outbound logs.
pub struct MetricsReporter {
    account: Arc<RwLock<Account>>,
    positions: Arc<RwLock<PositionBook>>,
    mode: Arc<RwLock<SystemMode>>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(
        account: Arc<RwLock<Account>>,
        positions: Arc<RwLock<PositionBook>>,
        mode: Arc<RwLock<SystemMode>>,
        metrics: Metrics,
        interval_seconds: u64,
    ) -> Self {
        Self {
            account,
            positions,
            mode,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "metrics reporter starting");
        loop {
            tokio::time::sleep(self.interval).await;
            let report = self.collect().await;
            match serde_json::to_string(&report) {
                Ok(json) => {
                    println!("STATUS_JSON:{json}");
                    info!(
                        balance = report.balance,
                        daily_pnl = report.daily_pnl,
                        mode = %report.mode,
                        positions = report.positions.len(),
                        "status report"
                    );
                }
                Err(e) => warn!(error = %e, "failed to serialize status report"),
            }
        }
    }

    async fn collect(&self) -> StatusReport {
        let account = self.account.read().await;
        let positions = self.positions.read().await;
        let mode = *self.mode.read().await;
        let report = StatusReport::build(mode, &account, &positions);

        self.metrics.balance_usd.set(report.balance);
        self.metrics.daily_pnl_usd.set(report.daily_pnl);
        self.metrics
            .positions_count
            .set(report.positions.len() as f64);
        for p in &report.positions {
            self.metrics.set_position_pnl(&p.symbol, p.unrealized_pnl);
        }
        self.metrics
            .uptime_seconds
            .set(self.start_time.elapsed().as_secs() as f64);

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn status_report_is_zero_daily_pnl_at_build() {
        let account = Arc::new(RwLock::new(Account::new(dec!(10000), 19723)));
        let positions = Arc::new(RwLock::new(PositionBook::new()));
        let mode = Arc::new(RwLock::new(SystemMode::Normal));
        let metrics = Metrics::new().expect("failed to create metrics");
        let reporter = MetricsReporter::new(account, positions, mode, metrics, 60);

        let report = reporter.collect().await;
        assert_eq!(report.daily_pnl, 0.0);
        assert_eq!(report.balance, 10000.0);
        assert!(report.positions.is_empty());
    }

    #[test]
    fn status_report_serializes_camel_case_daily_pnl() {
        let report = StatusReport {
            status: "ok".to_string(),
            mode: "running".to_string(),
            daily_pnl: -125.5,
            balance: 9874.5,
            positions: vec![],
        };
        let json = serde_json::to_string(&report).expect("failed to serialize");
        assert!(json.contains("\"dailyPnL\":-125.5"));
    }
}
