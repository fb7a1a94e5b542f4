//! Application-level configuration (spec §6, SPEC_FULL AMBIENT-3/AMBIENT-4).
//!
//! `Config::from_env()` is the only loader (YAML/secret-manager backends are
//! out of scope per spec §1); `dotenvy` loads a local `.env` before it runs,
//! in the binary only. Every field has the default named in spec §6.

use crate::domain::config::{MarketConfig, RangeConfig, RiskConfig, TrendConfig};
use crate::domain::market::timeframe::Timeframe;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    Live,
    Simulation,
    Backtest,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "live" => Ok(RunMode::Live),
            "simulation" | "sim" => Ok(RunMode::Simulation),
            "backtest" => Ok(RunMode::Backtest),
            other => Err(anyhow::anyhow!("invalid --mode '{other}'")),
        }
    }
}

/// The CLI surface named in spec §6 (core-relevant subset).
#[derive(Debug, clap::Parser)]
#[command(name = "engine", about = "Core automated trading engine")]
pub struct CliArgs {
    #[arg(long, value_enum, default_value = "live")]
    pub mode: RunMode,

    #[arg(long, value_delimiter = ',')]
    pub symbols: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    pub timeframes: Option<Vec<String>>,

    #[arg(long)]
    pub start_date: Option<String>,

    #[arg(long)]
    pub end_date: Option<String>,

    #[arg(long)]
    pub initial_balance: Option<Decimal>,

    #[arg(long)]
    pub slippage: Option<f64>,

    #[arg(long)]
    pub commission_rate: Option<f64>,

    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    #[arg(long, default_value_t = false)]
    pub smoke_test: bool,
}

/// Exit codes the engine binary returns (spec §6).
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const FATAL_ERROR: i32 = 1;
    pub const INVALID_CONFIG: i32 = 2;
    pub const KILL_SWITCH: i32 = 3;
}

/// Binance credentials and endpoint, loaded from env only (spec §1: secret
/// manager backends are an external collaborator, out of scope here).
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: RunMode,
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub initial_balance: Decimal,
    pub slippage: f64,
    pub commission_rate: f64,
    pub quiet: bool,
    pub smoke_test: bool,

    pub market: MarketConfig,
    pub trend: TrendConfig,
    pub range: RangeConfig,
    pub risk: RiskConfig,
    pub exchange: ExchangeCredentials,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, applying the
    /// defaults named in spec §6. Call `dotenvy::dotenv()` before this in
    /// the binary entry point, not here — the domain config layer stays
    /// ambient-free.
    pub fn from_env() -> Result<Self> {
        let market = MarketConfig::new(
            env_or("MARKET_SHORT_TERM_EMA", 10),
            env_or("MARKET_LONG_TERM_EMA", 50),
            env_or("MARKET_ATR_PERIOD", 14),
            env_or("MARKET_ADX_PERIOD", 14),
            env_or("MARKET_DONCHIAN_PERIOD", 20),
            env_or("MARKET_ATR_PERCENTAGE_THRESHOLD", 6.0),
            env_or("MARKET_SLOPE_HIGH_VOL_THRESHOLD", 6.0),
            env_or("MARKET_SLOPE_LOW_VOL_THRESHOLD", 2.0),
        )
        .context("invalid market.* configuration")?;

        let trend = TrendConfig::new(
            env_or("TREND_DONCHIAN_PERIOD", 20),
            env_or("TREND_ADX_PERIOD", 14),
            env_or("TREND_ADX_THRESHOLD", 25.0),
            env_or("TREND_ATR_TRAILING_STOP_MULTIPLIER", 1.2),
            env_or("TREND_ADD_ON_POSITION_MULTIPLIER", 0.5),
            env_or("TREND_MAX_PYRAMIDS", 2),
        )
        .context("invalid trend.* configuration")?;

        let range = RangeConfig::new(
            env_or("RANGE_PERIOD", 30),
            env_or("RANGE_GRID_LEVELS_MIN", 3),
            env_or("RANGE_GRID_LEVELS_MAX", 10),
            env_or("RANGE_GRID_WIDTH_MULTIPLIER", 0.6),
            env_or("RANGE_ESCAPE_THRESHOLD", 0.02),
            env_or("RANGE_NET_POSITION_DELTA_MAX", 0.15),
        )
        .context("invalid range.* configuration")?;

        let risk = RiskConfig::new(
            env_or("RISK_MAX_RISK_PER_TRADE", 0.01),
            env_or("RISK_MAX_DAILY_LOSS", 0.05),
            env_or("RISK_MAX_POSITION_SIZE", 0.35),
            env_or("RISK_ALLOW_SHRINK", false),
            env_or("RISK_EMERGENCY_GAP_THRESHOLD", 0.15),
            env_or("RISK_EMERGENCY_RECOVERY_THRESHOLD", 0.075),
            env_or("RISK_EMERGENCY_RECOVERY_HOURS", 24),
            env_or("RISK_DEFAULT_ATR_PCT", 0.02),
            env_or("RISK_MIN_STOP_DISTANCE_PCT", 0.01),
            env_or("RISK_MIN_ATR_VALUE", 0.0001),
        )
        .context("invalid risk.* configuration")?;

        let exchange = ExchangeCredentials {
            api_key: std::env::var("BINANCE_API_KEY").unwrap_or_default(),
            api_secret: std::env::var("BINANCE_API_SECRET").unwrap_or_default(),
            base_url: std::env::var("BINANCE_BASE_URL")
                .unwrap_or_else(|_| "https://api.binance.com".to_string()),
        };

        let symbols = std::env::var("ENGINE_SYMBOLS")
            .unwrap_or_else(|_| "SOL/USDT".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let timeframes = std::env::var("ENGINE_TIMEFRAMES")
            .unwrap_or_else(|_| "1h".to_string())
            .split(',')
            .filter_map(|s| Timeframe::from_str(s.trim()).ok())
            .collect();

        Ok(Self {
            mode: RunMode::Live,
            symbols,
            timeframes,
            start_date: None,
            end_date: None,
            initial_balance: env_or("ENGINE_INITIAL_BALANCE", Decimal::new(10_000, 0)),
            slippage: env_or("ENGINE_SLIPPAGE", 0.0005),
            commission_rate: env_or("ENGINE_COMMISSION_RATE", 0.001),
            quiet: env_or("ENGINE_QUIET", false),
            smoke_test: false,
            market,
            trend,
            range,
            risk,
            exchange,
        })
    }

    /// Applies CLI overrides on top of `Config::from_env()`, per spec §6.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        self.mode = args.mode;
        if let Some(symbols) = &args.symbols {
            self.symbols = symbols.clone();
        }
        if let Some(timeframes) = &args.timeframes {
            self.timeframes = timeframes
                .iter()
                .filter_map(|s| Timeframe::from_str(s).ok())
                .collect();
        }
        self.start_date = args.start_date.clone();
        self.end_date = args.end_date.clone();
        if let Some(balance) = args.initial_balance {
            self.initial_balance = balance;
        }
        if let Some(slippage) = args.slippage {
            self.slippage = slippage;
        }
        if let Some(commission) = args.commission_rate {
            self.commission_rate = commission;
        }
        self.quiet = args.quiet;
        self.smoke_test = args.smoke_test;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_applies_spec_defaults_when_unset() {
        for key in [
            "MARKET_SHORT_TERM_EMA",
            "TREND_MAX_PYRAMIDS",
            "RISK_MAX_RISK_PER_TRADE",
        ] {
            unsafe {
                std::env::remove_var(key);
            }
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.market.short_term_ema, 10);
        assert_eq!(config.trend.max_pyramids, 2);
        assert_eq!(config.risk.max_risk_per_trade, 0.01);
    }

    #[test]
    fn run_mode_parses_case_insensitively() {
        assert_eq!(RunMode::from_str("LIVE").unwrap(), RunMode::Live);
        assert_eq!(RunMode::from_str("backtest").unwrap(), RunMode::Backtest);
        assert!(RunMode::from_str("bogus").is_err());
    }
}
