//! Push-based observability (spec §6): structured JSON status logs plus an
//! in-process Prometheus registry. No HTTP server or scrape endpoint is
//! bound anywhere in this crate.

pub mod latency_tracker;
pub mod metrics;
pub mod reporter;

pub use latency_tracker::LatencyGuard;
pub use metrics::Metrics;
pub use reporter::{MetricsReporter, StatusReport};
