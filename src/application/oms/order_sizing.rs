//! OrderSizing (spec §4.10): quantises a risk-sized `Signal` to the venue's
//! lot/tick/min-notional rules before it becomes an `Order`.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Exchange filter rules for one symbol (spec §4.10). Typically sourced
/// from Binance's `GET /api/v3/exchangeInfo` `LOT_SIZE`/`PRICE_FILTER`/
/// `MIN_NOTIONAL` filters.
#[derive(Debug, Clone, Copy)]
pub struct VenueInfo {
    pub step_size: Decimal,
    pub tick_size: Decimal,
    pub min_notional: Decimal,
}

struct CacheEntry {
    info: VenueInfo,
    fetched_at: Instant,
}

/// Caches `VenueInfo` per symbol with a TTL, so the OMS doesn't re-fetch
/// exchange filters on every order (spec §4.10).
pub struct VenueInfoCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl VenueInfoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<VenueInfo> {
        let entry = self.entries.get(symbol)?;
        if entry.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.info)
    }

    pub fn put(&mut self, symbol: impl Into<String>, info: VenueInfo) {
        self.entries.insert(
            symbol.into(),
            CacheEntry {
                info,
                fetched_at: Instant::now(),
            },
        );
    }
}

pub struct OrderSizing;

impl OrderSizing {
    /// Rounds `amount` down to the nearest `step_size` multiple (never up —
    /// rounding up could exceed the risk-computed size).
    pub fn quantize_amount(amount: Decimal, step_size: Decimal) -> Decimal {
        if step_size <= Decimal::ZERO {
            return amount;
        }
        (amount / step_size).floor() * step_size
    }

    /// Rounds `price` to the nearest `tick_size` multiple.
    pub fn quantize_price(price: Decimal, tick_size: Decimal) -> Decimal {
        if tick_size <= Decimal::ZERO {
            return price;
        }
        (price / tick_size).round() * tick_size
    }

    /// Whether `amount * price` clears the venue's minimum order notional.
    pub fn meets_min_notional(amount: Decimal, price: Decimal, min_notional: Decimal) -> bool {
        amount * price >= min_notional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantize_amount_rounds_down_to_step() {
        assert_eq!(OrderSizing::quantize_amount(dec!(1.237), dec!(0.01)), dec!(1.23));
    }

    #[test]
    fn quantize_price_rounds_to_nearest_tick() {
        assert_eq!(OrderSizing::quantize_price(dec!(100.004), dec!(0.01)), dec!(100.00));
    }

    #[test]
    fn min_notional_check() {
        assert!(OrderSizing::meets_min_notional(dec!(1), dec!(50), dec!(10)));
        assert!(!OrderSizing::meets_min_notional(dec!(0.1), dec!(50), dec!(10)));
    }

    #[test]
    fn cache_expires_after_ttl() {
        let mut cache = VenueInfoCache::new(Duration::from_millis(0));
        cache.put(
            "SOL/USDT",
            VenueInfo {
                step_size: dec!(0.01),
                tick_size: dec!(0.01),
                min_notional: dec!(10),
            },
        );
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("SOL/USDT").is_none());
    }
}
