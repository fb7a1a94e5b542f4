//! EmergencyStrategy: the sole strategy dispatched while `SystemMode` is
//! EMERGENCY (spec §4.3). Its only job is flattening open positions with
//! reduce-only market orders — no new entries are ever produced.

use crate::domain::trading::types::{OrderSide, OrderType, Purpose, Signal};
use std::collections::HashSet;

use super::{StrategyContext, StrategyOutput, TradingStrategy};

#[derive(Default)]
pub struct EmergencyStrategy {
    /// Symbols with a flatten order already in flight this emergency
    /// episode, so a slow engine loop doesn't resend one every tick.
    flattening: HashSet<String>,
}

impl EmergencyStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradingStrategy for EmergencyStrategy {
    fn name(&self) -> &'static str {
        "emergency"
    }

    fn on_tick(&mut self, ctx: &StrategyContext) -> StrategyOutput {
        let Some(position) = ctx.position else {
            self.flattening.remove(&ctx.candle.symbol);
            return StrategyOutput::empty();
        };

        if self.flattening.contains(&position.symbol) {
            return StrategyOutput::empty();
        }
        self.flattening.insert(position.symbol.clone());

        let mut out = StrategyOutput::with_signal(Signal {
            symbol: position.symbol.clone(),
            side: position.side.opposite(),
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            amount: position.amount,
            purpose: Purpose::EmergencyClose,
            strategy_tag: "emergency".into(),
            post_only: false,
        });
        out.diagnostics = out
            .diagnostics
            .note(format!("black-swan flatten of {}", position.symbol));
        out
    }
}
