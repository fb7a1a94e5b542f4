//! Core engine binary (spec §6 CLI surface) - headless, no UI, no HTTP
//! server. Logs are the only observability surface: structured `tracing`
//! output plus a periodic `STATUS_JSON:` line from `MetricsReporter`,
//! mirroring the teacher's `src/bin/server.rs`.
//!
//! # Usage
//! ```sh
//! cargo run --bin engine -- --mode live --symbols SOL/USDT
//! ```
//!
//! # Environment Variables
//! - `OBSERVABILITY_ENABLED` - Enable periodic status reporting (default: true)
//! - `OBSERVABILITY_INTERVAL` - Seconds between status reports (default: 60)
//! - see `Config::from_env` for the full `market.*`/`trend.*`/`range.*`/`risk.*` surface

use std::process::ExitCode;

use clap::Parser;
use solbot_core::application::bootstrap::Application;
use solbot_core::config::{exit_code, CliArgs, Config, RunMode};
use solbot_core::infrastructure::observability::MetricsReporter;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "engine starting");

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(exit_code::INVALID_CONFIG as u8);
        }
    };
    config.apply_cli(&args);
    info!(mode = ?config.mode, symbols = ?config.symbols, "configuration loaded");

    let app = match Application::build(config.clone()).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to build application");
            return ExitCode::from(exit_code::FATAL_ERROR as u8);
        }
    };

    let account = app.account.clone();
    let positions = app.positions.clone();
    let metrics = app.metrics.clone();

    let handle = match app.start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start application");
            return ExitCode::from(exit_code::FATAL_ERROR as u8);
        }
    };
    info!("engine running");

    if observability_enabled() {
        let interval = observability_interval();
        let reporter = MetricsReporter::new(
            account,
            positions,
            handle.mode.clone(),
            metrics,
            interval,
        );
        tokio::spawn(reporter.run());
        info!(interval_secs = interval, "status reporter started");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return ExitCode::from(exit_code::FATAL_ERROR as u8);
    }
    info!("shutdown signal received");

    let flatten_on_exit = matches!(config.mode, RunMode::Live);
    handle.shutdown.shutdown(flatten_on_exit).await;

    if *handle.mode.read().await == solbot_core::domain::trading::types::SystemMode::KillSwitch {
        info!("exiting after kill switch");
        return ExitCode::from(exit_code::KILL_SWITCH as u8);
    }

    info!("engine shut down cleanly");
    ExitCode::from(exit_code::SUCCESS as u8)
}

fn observability_enabled() -> bool {
    std::env::var("OBSERVABILITY_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true)
}

fn observability_interval() -> u64 {
    std::env::var("OBSERVABILITY_INTERVAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}
