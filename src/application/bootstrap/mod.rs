//! Two-phase startup (spec §5, SPEC_FULL SUPPLEMENT-3), grounded on the
//! teacher's `application/bootstrap/{agents,persistence,services}.rs` split
//! between "construct everything" and "spawn the tasks": `Application::build`
//! lives here; `Application::start` is [`crate::application::system`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{Config, RunMode};
use crate::domain::repositories::{CandleRepository, MetricsRepository, OrderRepository};
use crate::domain::trading::position_book::PositionBook;
use crate::domain::trading::types::Account;
use crate::infrastructure::binance::BinanceAdapter;
use crate::infrastructure::mock::MockAdapter;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::{DirectoryLock, JsonFileStore};

use crate::domain::ports::ExchangeAdapter;

/// Everything `Application::start` needs to spawn the task set. Built once
/// at process startup; never mutated afterward (fields the tasks share are
/// already `Arc`/`Arc<RwLock<_>>`).
pub struct Application {
    pub config: Config,
    pub adapter: Arc<dyn ExchangeAdapter>,
    pub account: Arc<RwLock<Account>>,
    pub positions: Arc<RwLock<PositionBook>>,
    pub candle_repository: Arc<dyn CandleRepository>,
    pub order_repository: Arc<dyn OrderRepository>,
    pub metrics_repository: Arc<dyn MetricsRepository>,
    pub metrics: Metrics,
    /// Held for the process lifetime — enforces the "no concurrent writers
    /// across processes" invariant of spec §5. Dropping it releases the lock.
    _data_dir_lock: DirectoryLock,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(mode = ?config.mode, symbols = ?config.symbols, "building application");

        let data_dir = PathBuf::from(std::env::var("ENGINE_DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let data_dir_lock = DirectoryLock::acquire(&data_dir)?;

        let store = Arc::new(JsonFileStore::new(data_dir));

        let adapter: Arc<dyn ExchangeAdapter> = match config.mode {
            RunMode::Live => Arc::new(BinanceAdapter::new(
                config.exchange.api_key.clone(),
                config.exchange.api_secret.clone(),
                config.exchange.base_url.clone(),
            )),
            RunMode::Simulation | RunMode::Backtest => {
                Arc::new(MockAdapter::new(config.initial_balance))
            }
        };

        let midnight_day = Utc::now().timestamp_millis().div_euclid(86_400_000);
        let account = Arc::new(RwLock::new(Account::new(config.initial_balance, midnight_day)));
        let positions = Arc::new(RwLock::new(PositionBook::new()));
        let metrics = Metrics::new()?;

        Ok(Self {
            config,
            adapter,
            account,
            positions,
            candle_repository: store.clone(),
            order_repository: store.clone(),
            metrics_repository: store,
            metrics,
            _data_dir_lock: data_dir_lock,
        })
    }
}
