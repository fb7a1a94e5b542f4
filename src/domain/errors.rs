use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the OMS order lifecycle (spec §7).
#[derive(Debug, Error)]
pub enum OmsError {
    #[error("retryable network error: {reason}")]
    RetryableNetwork { reason: String },

    #[error("exchange rejected order permanently: {code} {reason}")]
    PermanentRejected { code: String, reason: String },

    #[error("insufficient funds: need {need}, available {available}")]
    InsufficientFunds { need: Decimal, available: Decimal },

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("unknown order id: {0}")]
    UnknownOrder(String),
}

impl OmsError {
    /// Whether a `PlacementTask` should retry after this error, per spec §4.7/§7.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OmsError::RetryableNetwork { .. })
    }
}

/// Errors from an `ExchangeAdapter` call, carrying the retryable flag the
/// adapter contract requires (spec §6).
#[derive(Debug, Error)]
#[error("exchange error ({code}): {reason}")]
pub struct ExchangeError {
    pub code: String,
    pub reason: String,
    pub retryable: bool,
}

impl ExchangeError {
    pub fn retryable(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn permanent(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
            retryable: false,
        }
    }
}

impl From<ExchangeError> for OmsError {
    fn from(e: ExchangeError) -> Self {
        if e.retryable {
            OmsError::RetryableNetwork { reason: e.reason }
        } else {
            OmsError::PermanentRejected {
                code: e.code,
                reason: e.reason,
            }
        }
    }
}

/// Why the risk filter dropped or resized a signal (spec §4.6). These are
/// not fatal: the engine logs them and moves on to the next signal.
#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    #[error("entries blocked while system mode is {mode}")]
    EntriesBlocked { mode: String },

    #[error("position size would exceed max_position_size ({cap})")]
    PositionSizeCapExceeded { cap: Decimal },

    #[error("daily loss limit already breached ({daily_pnl_pct:.4} <= -{max_daily_loss:.4})")]
    DailyLossLimitBreached {
        daily_pnl_pct: Decimal,
        max_daily_loss: Decimal,
    },

    #[error("signal failed validation: {reason}")]
    InvalidSignal { reason: String },

    #[error("computed stop distance is non-positive: {distance}")]
    DegenerateStopDistance { distance: Decimal },
}

/// Errors from persisted/market data handling (spec §7 `DataStale`).
#[derive(Debug, Error)]
pub enum DataError {
    #[error("candle older than last seen for {symbol}/{timeframe}: {t_open} <= {last_seen}")]
    Stale {
        symbol: String,
        timeframe: String,
        t_open: i64,
        last_seen: i64,
    },

    #[error("failed to read/write persisted state at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("malformed persisted record in {path}: {reason}")]
    Malformed { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_network_is_retryable() {
        let e = OmsError::RetryableNetwork {
            reason: "timeout".into(),
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn permanent_rejection_is_not_retryable() {
        let e = OmsError::PermanentRejected {
            code: "INVALID_PRICE".into(),
            reason: "tick size".into(),
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn exchange_error_conversion_preserves_retryable_flag() {
        let retryable: OmsError = ExchangeError::retryable("429", "rate limited").into();
        assert!(matches!(retryable, OmsError::RetryableNetwork { .. }));

        let permanent: OmsError = ExchangeError::permanent("400", "bad request").into();
        assert!(matches!(permanent, OmsError::PermanentRejected { .. }));
    }
}
