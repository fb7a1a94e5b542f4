//! The synchronous order/position core (spec §4.7, §4.8). Kept free of
//! tokio/async so the partial-fill and duplicate-fill scenarios (spec §8
//! scenario 5) can be driven deterministically in unit tests.

use crate::domain::errors::OmsError;
use crate::domain::trading::position_book::{FillOutcome, Position, PositionBook};
use crate::domain::trading::types::{Fill, Order, OrderStatus, Signal};
use std::collections::{HashMap, HashSet};

/// What happened when a `Fill` was applied (spec §4.7/§4.8).
#[derive(Debug)]
pub enum FillApplication {
    /// The trade id had already been recorded against this order; ignored.
    Duplicate,
    Applied {
        order_status: OrderStatus,
        position_outcome: FillOutcome,
    },
}

/// One `(symbol, exchange)` order table plus the position book it feeds,
/// both owned exclusively by the OMS (spec §5).
pub struct OrderBook {
    exchange_id: String,
    orders: HashMap<String, Order>,
    positions: PositionBook,
    /// Dedup key `(exchange_order_id, exchange_trade_id)` (spec §4.7).
    seen_trades: HashSet<(String, String)>,
    next_id: u64,
}

impl OrderBook {
    pub fn new(exchange_id: impl Into<String>) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            orders: HashMap::new(),
            positions: PositionBook::new(),
            seen_trades: HashSet::new(),
            next_id: 0,
        }
    }

    pub fn exchange_id(&self) -> &str {
        &self.exchange_id
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut PositionBook {
        &mut self.positions
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| {
            matches!(
                o.status,
                OrderStatus::Open | OrderStatus::Placed | OrderStatus::PartiallyFilled
            )
        })
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("oms-{}", self.next_id)
    }

    /// Registers a new order from a risk-sized signal (spec §4.7 step:
    /// "risk-approved signal -> Order in OPEN status before placement").
    pub fn create_order(&mut self, signal: &Signal, now: i64) -> Order {
        let id = self.fresh_id();
        let order = Order::from_signal(signal, id.clone(), now);
        self.orders.insert(id, order.clone());
        order
    }

    /// Records a successful placement acknowledgement.
    pub fn mark_placed(&mut self, id: &str, exchange_order_id: String, now: i64) -> Result<(), OmsError> {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| OmsError::UnknownOrder(id.to_string()))?;
        order.exchange_order_id = Some(exchange_order_id);
        order.status = OrderStatus::Placed;
        order.last_update_t = now;
        Ok(())
    }

    pub fn mark_rejected(&mut self, id: &str, now: i64) -> Result<(), OmsError> {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| OmsError::UnknownOrder(id.to_string()))?;
        order.status = OrderStatus::Rejected;
        order.last_update_t = now;
        Ok(())
    }

    pub fn cancel(&mut self, id: &str, now: i64) -> Result<(), OmsError> {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| OmsError::UnknownOrder(id.to_string()))?;
        if matches!(order.status, OrderStatus::Filled | OrderStatus::Canceled) {
            return Ok(());
        }
        order.status = OrderStatus::Canceled;
        order.last_update_t = now;
        Ok(())
    }

    /// Applies a fill to its order and the position book, deduplicating on
    /// `(exchange_order_id, exchange_trade_id)` (spec §4.7, §8 scenario 5:
    /// the exchange may redeliver the same trade on reconnect).
    pub fn apply_fill(&mut self, fill: Fill) -> Result<FillApplication, OmsError> {
        let Some(exchange_order_id) = fill.exchange_order_id.clone() else {
            return Err(OmsError::InvalidOrder {
                reason: "fill missing exchange_order_id".to_string(),
            });
        };
        let dedup_key = (exchange_order_id, fill.exchange_trade_id.clone());
        if self.seen_trades.contains(&dedup_key) {
            return Ok(FillApplication::Duplicate);
        }

        let order = self
            .orders
            .get_mut(&fill.order_id)
            .ok_or_else(|| OmsError::UnknownOrder(fill.order_id.clone()))?;

        let new_filled = order.filled_amount + fill.amount;
        if new_filled > order.amount {
            return Err(OmsError::InvariantViolation {
                reason: format!(
                    "fill would overfill order {}: {} + {} > {}",
                    order.id, order.filled_amount, fill.amount, order.amount
                ),
            });
        }

        let prior_notional = order.avg_fill_price.unwrap_or_default() * order.filled_amount;
        let new_avg = if new_filled.is_zero() {
            order.avg_fill_price
        } else {
            Some((prior_notional + fill.price * fill.amount) / new_filled)
        };
        order.filled_amount = new_filled;
        order.avg_fill_price = new_avg;
        order.last_update_t = fill.t;
        order.status = if new_filled == order.amount {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        debug_assert!(order.check_fill_invariant());
        let order_status = order.status;

        self.seen_trades.insert(dedup_key);
        let position_outcome = self.positions.apply_fill(&fill, &self.exchange_id);

        Ok(FillApplication::Applied {
            order_status,
            position_outcome,
        })
    }

    /// Emits reduce-only exit signals closing every tracked position (spec
    /// §4.7 kill-switch / graceful-shutdown path).
    pub fn close_all_positions(&self) -> Vec<crate::domain::trading::types::Signal> {
        use crate::domain::trading::types::{OrderType, Purpose, Signal};
        self.positions
            .all()
            .map(|p: &Position| Signal {
                symbol: p.symbol.clone(),
                side: p.side.opposite(),
                order_type: OrderType::Market,
                price: None,
                stop_price: None,
                amount: p.amount,
                purpose: Purpose::EmergencyClose,
                strategy_tag: "shutdown".to_string(),
                post_only: false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{OrderSide, OrderType, Purpose};
    use rust_decimal_macros::dec;

    fn buy_signal() -> Signal {
        Signal {
            symbol: "SOL/USDT".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: None,
            stop_price: Some(dec!(95)),
            amount: dec!(10),
            purpose: Purpose::Entry,
            strategy_tag: "trend".into(),
            post_only: false,
        }
    }

    fn fill(order_id: &str, amount: rust_decimal::Decimal, trade_id: &str) -> Fill {
        Fill {
            order_id: order_id.to_string(),
            exchange_order_id: Some("ex-1".into()),
            exchange_trade_id: trade_id.into(),
            symbol: "SOL/USDT".into(),
            side: OrderSide::Buy,
            amount,
            price: dec!(100),
            t: 0,
            fee: None,
        }
    }

    #[test]
    fn partial_then_full_fill_transitions_status_and_opens_position() {
        let mut book = OrderBook::new("binance");
        let order = book.create_order(&buy_signal(), 0);
        book.mark_placed(&order.id, "ex-1".into(), 0).unwrap();

        let first = book.apply_fill(fill(&order.id, dec!(4), "t1")).unwrap();
        match first {
            FillApplication::Applied { order_status, .. } => {
                assert_eq!(order_status, OrderStatus::PartiallyFilled)
            }
            _ => panic!("expected Applied"),
        }

        let second = book.apply_fill(fill(&order.id, dec!(6), "t2")).unwrap();
        match second {
            FillApplication::Applied { order_status, .. } => {
                assert_eq!(order_status, OrderStatus::Filled)
            }
            _ => panic!("expected Applied"),
        }

        let stored = book.get(&order.id).unwrap();
        assert_eq!(stored.filled_amount, dec!(10));
        assert!(book.positions().get("SOL/USDT", "binance").is_some());
    }

    #[test]
    fn duplicate_trade_id_is_ignored() {
        let mut book = OrderBook::new("binance");
        let order = book.create_order(&buy_signal(), 0);
        book.mark_placed(&order.id, "ex-1".into(), 0).unwrap();

        book.apply_fill(fill(&order.id, dec!(10), "t1")).unwrap();
        let redelivered = book.apply_fill(fill(&order.id, dec!(10), "t1")).unwrap();
        assert!(matches!(redelivered, FillApplication::Duplicate));

        let stored = book.get(&order.id).unwrap();
        assert_eq!(stored.filled_amount, dec!(10)); // not double-applied
    }

    #[test]
    fn overfill_is_rejected_as_invariant_violation() {
        let mut book = OrderBook::new("binance");
        let order = book.create_order(&buy_signal(), 0);
        book.mark_placed(&order.id, "ex-1".into(), 0).unwrap();
        book.apply_fill(fill(&order.id, dec!(10), "t1")).unwrap();

        let err = book.apply_fill(fill(&order.id, dec!(1), "t2")).unwrap_err();
        assert!(matches!(err, OmsError::InvariantViolation { .. }));
    }

    #[test]
    fn close_all_positions_emits_reduce_only_exits() {
        let mut book = OrderBook::new("binance");
        let order = book.create_order(&buy_signal(), 0);
        book.mark_placed(&order.id, "ex-1".into(), 0).unwrap();
        book.apply_fill(fill(&order.id, dec!(10), "t1")).unwrap();

        let exits = book.close_all_positions();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].side, OrderSide::Sell);
        assert_eq!(exits[0].purpose, Purpose::EmergencyClose);
        assert_eq!(exits[0].amount, dec!(10));
    }
}
