//! Prometheus metric definitions for the trading engine.
//!
//! All metrics use the `solbot_` prefix. No HTTP server or scrape endpoint
//! is bound anywhere in this crate (spec §1 non-goal) — `render()` exists
//! only so the push-based [`super::reporter::MetricsReporter`] can log the
//! text exposition format alongside its JSON snapshot.

use prometheus::{
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// In-process counters/gauges for the engine (spec §6 observability).
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Account equity (balance) in quote currency.
    pub balance_usd: GenericGauge<AtomicF64>,
    /// Number of open positions across all symbols.
    pub positions_count: GenericGauge<AtomicF64>,
    /// Unrealized P&L per symbol.
    pub position_unrealized_pnl_usd: GenericGaugeVec<AtomicF64>,
    /// Today's realized + unrealized P&L vs. the midnight balance anchor.
    pub daily_pnl_usd: GenericGauge<AtomicF64>,
    /// Current `SystemMode` as a gauge (0=Normal .. 4=KillSwitch).
    pub system_mode: GenericGauge<AtomicF64>,
    /// Orders placed, by side and terminal status.
    pub orders_total: CounterVec,
    /// Circuit breaker state per exchange adapter (0=closed, 1=open).
    pub circuit_breaker_status: GaugeVec,
    /// Engine uptime in seconds.
    pub uptime_seconds: GenericGauge<AtomicF64>,
    /// Exchange REST call latency.
    pub api_latency_seconds: HistogramVec,
    /// Strategy signals generated, by strategy tag and side.
    pub trade_signals_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let balance_usd =
            Gauge::with_opts(Opts::new("solbot_balance_usd", "Account balance in quote currency"))?;
        registry.register(Box::new(balance_usd.clone()))?;

        let positions_count = Gauge::with_opts(Opts::new(
            "solbot_positions_count",
            "Number of open positions",
        ))?;
        registry.register(Box::new(positions_count.clone()))?;

        let position_unrealized_pnl_usd = GaugeVec::new(
            Opts::new(
                "solbot_position_unrealized_pnl_usd",
                "Unrealized P&L per symbol",
            ),
            &["symbol"],
        )?;
        registry.register(Box::new(position_unrealized_pnl_usd.clone()))?;

        let daily_pnl_usd =
            Gauge::with_opts(Opts::new("solbot_daily_pnl_usd", "Daily P&L vs. midnight anchor"))?;
        registry.register(Box::new(daily_pnl_usd.clone()))?;

        let system_mode = Gauge::with_opts(Opts::new(
            "solbot_system_mode",
            "Current SystemMode (0=Normal,1=RiskReduction,2=Standby,3=Emergency,4=KillSwitch)",
        ))?;
        registry.register(Box::new(system_mode.clone()))?;

        let orders_total = CounterVec::new(
            Opts::new("solbot_orders_total", "Total orders by side and status"),
            &["side", "status"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        let circuit_breaker_status = GaugeVec::new(
            Opts::new(
                "solbot_circuit_breaker_status",
                "Circuit breaker state per exchange (0=closed, 1=open)",
            ),
            &["exchange"],
        )?;
        registry.register(Box::new(circuit_breaker_status.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "solbot_uptime_seconds",
            "Engine uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let api_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "solbot_api_latency_seconds",
                "Exchange REST call latency in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["exchange", "endpoint"],
        )?;
        registry.register(Box::new(api_latency_seconds.clone()))?;

        let trade_signals_total = CounterVec::new(
            Opts::new(
                "solbot_trade_signals_total",
                "Total strategy signals generated",
            ),
            &["strategy", "side"],
        )?;
        registry.register(Box::new(trade_signals_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            balance_usd,
            positions_count,
            position_unrealized_pnl_usd,
            daily_pnl_usd,
            system_mode,
            orders_total,
            circuit_breaker_status,
            uptime_seconds,
            api_latency_seconds,
            trade_signals_total,
        })
    }

    /// Renders all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn set_position_pnl(&self, symbol: &str, pnl: f64) {
        self.position_unrealized_pnl_usd
            .with_label_values(&[symbol])
            .set(pnl);
    }

    pub fn inc_orders(&self, side: &str, status: &str) {
        self.orders_total.with_label_values(&[side, status]).inc();
    }

    pub fn set_circuit_breaker_status(&self, exchange: &str, open: bool) {
        self.circuit_breaker_status
            .with_label_values(&[exchange])
            .set(if open { 1.0 } else { 0.0 });
    }

    pub fn observe_api_latency(&self, exchange: &str, endpoint: &str, latency: f64) {
        self.api_latency_seconds
            .with_label_values(&[exchange, endpoint])
            .observe(latency);
    }

    pub fn inc_signals(&self, strategy: &str, side: &str) {
        self.trade_signals_total
            .with_label_values(&[strategy, side])
            .inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("static metric definitions cannot fail to register")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_contains_prefix() {
        let metrics = Metrics::new().expect("failed to create metrics");
        assert!(metrics.render().contains("solbot_"));
    }

    #[test]
    fn balance_gauge_updates() {
        let metrics = Metrics::new().expect("failed to create metrics");
        metrics.balance_usd.set(10_000.0);
        let output = metrics.render();
        assert!(output.contains("solbot_balance_usd 10000"));
    }

    #[test]
    fn position_pnl_is_labeled_by_symbol() {
        let metrics = Metrics::new().expect("failed to create metrics");
        metrics.set_position_pnl("SOL/USDT", 42.5);
        let output = metrics.render();
        assert!(output.contains("solbot_position_unrealized_pnl_usd"));
        assert!(output.contains("SOL/USDT"));
    }

    #[test]
    fn order_counter_increments() {
        let metrics = Metrics::new().expect("failed to create metrics");
        metrics.inc_orders("buy", "filled");
        metrics.inc_orders("sell", "rejected");
        let output = metrics.render();
        assert!(output.contains("solbot_orders_total"));
    }
}
