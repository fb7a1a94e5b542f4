//! Async OMS scenarios driven directly through `OmsTask` against a
//! `MockAdapter` — no channels or supervisor task needed since `OmsTask`
//! itself is the deterministic, directly-testable async core.

use rust_decimal_macros::dec;
use std::sync::Arc;

use solbot_core::application::oms::order_book::FillApplication;
use solbot_core::application::oms::OmsTask;
use solbot_core::domain::ports::ExchangeAdapter;
use solbot_core::domain::trading::types::{
    Fill, OrderSide, OrderStatus, OrderType, Purpose, Signal,
};
use solbot_core::infrastructure::mock::MockAdapter;

fn entry_signal() -> Signal {
    Signal {
        symbol: "SOL/USDT".into(),
        side: OrderSide::Buy,
        order_type: OrderType::Market,
        price: None,
        stop_price: Some(dec!(90)),
        amount: dec!(10),
        purpose: Purpose::Entry,
        strategy_tag: "trend".into(),
        post_only: false,
    }
}

#[tokio::test]
async fn partial_fill_then_duplicate_then_full_fill() {
    let adapter = Arc::new(MockAdapter::new(dec!(10000)));
    let mut oms = OmsTask::new("mock", adapter);

    let order = oms.place_signal(entry_signal(), 0).await.unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
    let exchange_order_id = order.exchange_order_id.clone().unwrap();

    let fill1 = Fill {
        order_id: order.id.clone(),
        exchange_order_id: Some(exchange_order_id.clone()),
        exchange_trade_id: "trade-1".into(),
        symbol: "SOL/USDT".into(),
        side: OrderSide::Buy,
        amount: dec!(4),
        price: dec!(100),
        t: 1,
        fee: None,
    };
    let applied = oms.apply_fill(fill1.clone()).await.unwrap();
    match applied {
        FillApplication::Applied { order_status, .. } => {
            assert_eq!(order_status, OrderStatus::PartiallyFilled);
        }
        FillApplication::Duplicate => panic!("first application of a fill must not be a duplicate"),
    }

    // Redelivering the exact same fill (same exchange/trade id pair) must
    // be ignored rather than double-counted.
    let replay = oms.apply_fill(fill1).await.unwrap();
    assert!(matches!(replay, FillApplication::Duplicate));

    let fill2 = Fill {
        order_id: order.id.clone(),
        exchange_order_id: Some(exchange_order_id),
        exchange_trade_id: "trade-2".into(),
        symbol: "SOL/USDT".into(),
        side: OrderSide::Buy,
        amount: dec!(6),
        price: dec!(101),
        t: 2,
        fee: None,
    };
    let applied = oms.apply_fill(fill2).await.unwrap();
    match applied {
        FillApplication::Applied { order_status, .. } => {
            assert_eq!(order_status, OrderStatus::Filled);
        }
        FillApplication::Duplicate => panic!("a new trade id must never be treated as a duplicate"),
    }

    let position = oms
        .book()
        .positions()
        .get("SOL/USDT", "mock")
        .expect("a fully-filled entry must open a tracked position");
    assert_eq!(position.amount, dec!(10));
}

#[tokio::test]
async fn overfilling_an_order_is_rejected_as_an_invariant_violation() {
    let adapter = Arc::new(MockAdapter::new(dec!(10000)));
    let mut oms = OmsTask::new("mock", adapter);

    let order = oms.place_signal(entry_signal(), 0).await.unwrap();
    let exchange_order_id = order.exchange_order_id.clone().unwrap();

    let too_much = Fill {
        order_id: order.id,
        exchange_order_id: Some(exchange_order_id),
        exchange_trade_id: "trade-1".into(),
        symbol: "SOL/USDT".into(),
        side: OrderSide::Buy,
        amount: dec!(15), // order only asked for 10
        price: dec!(100),
        t: 1,
        fee: None,
    };
    assert!(oms.apply_fill(too_much).await.is_err());
}

#[tokio::test]
async fn shutdown_flattens_every_open_position_with_reduce_only_exits() {
    let adapter = Arc::new(MockAdapter::new(dec!(10000)));
    let mut oms = OmsTask::new("mock", adapter.clone());

    let order = oms.place_signal(entry_signal(), 0).await.unwrap();
    let exchange_order_id = order.exchange_order_id.clone().unwrap();
    let fill = Fill {
        order_id: order.id.clone(),
        exchange_order_id: Some(exchange_order_id),
        exchange_trade_id: "trade-1".into(),
        symbol: "SOL/USDT".into(),
        side: OrderSide::Buy,
        amount: dec!(10),
        price: dec!(100),
        t: 1,
        fee: None,
    };
    oms.apply_fill(fill).await.unwrap();
    assert!(oms.book().positions().get("SOL/USDT", "mock").is_some());

    let results = oms.close_all_positions(2).await;
    assert_eq!(results.len(), 1);
    let exit = results.into_iter().next().unwrap().unwrap();
    assert_eq!(exit.side, OrderSide::Sell);
    assert_eq!(exit.amount, dec!(10));
    assert!(exit.reduce_only);
    assert_eq!(exit.status, OrderStatus::Placed);

    let open_orders = adapter.fetch_open_orders(Some("SOL/USDT")).await.unwrap();
    assert!(
        open_orders.iter().any(|o| o.id == exit.id),
        "the flatten order must actually have been placed on the venue"
    );
}
