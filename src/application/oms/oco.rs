//! OCO (one-cancels-other) emulation (spec §4.7, §4.9): a small state
//! machine the OMS drives itself when `ExchangeAdapter::supports_oco()` is
//! false, since Binance spot does support native OCO but the mock/backtest
//! adapters and some venues the original system targeted do not.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcoLeg {
    TakeProfit,
    StopLoss,
}

#[derive(Debug, Clone)]
struct OcoPair {
    take_profit_order_id: String,
    stop_loss_order_id: String,
}

/// Tracks linked take-profit/stop-loss order pairs. When one leg terminates
/// (fills or is cancelled), the manager returns the sibling order id so the
/// caller can cancel it on the venue.
#[derive(Default)]
pub struct OcoManager {
    pairs: Vec<OcoPair>,
    leg_index: HashMap<String, usize>,
}

impl OcoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, take_profit_order_id: String, stop_loss_order_id: String) {
        let idx = self.pairs.len();
        self.leg_index.insert(take_profit_order_id.clone(), idx);
        self.leg_index.insert(stop_loss_order_id.clone(), idx);
        self.pairs.push(OcoPair {
            take_profit_order_id,
            stop_loss_order_id,
        });
    }

    /// Call when `order_id` fills or is cancelled. Returns the sibling order
    /// id to cancel, if `order_id` was part of a tracked pair.
    pub fn on_order_terminal(&mut self, order_id: &str) -> Option<String> {
        let idx = self.leg_index.remove(order_id)?;
        let pair = self.pairs.get(idx)?;
        let sibling = if pair.take_profit_order_id == order_id {
            pair.stop_loss_order_id.clone()
        } else {
            pair.take_profit_order_id.clone()
        };
        self.leg_index.remove(&sibling);
        Some(sibling)
    }
}
