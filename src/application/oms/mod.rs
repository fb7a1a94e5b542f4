//! Order Management System (spec §4.7): a synchronous, directly-testable
//! [`order_book::OrderBook`] wrapped by an async [`oms_task::OmsTask`] for
//! the tokio concurrency model (spec §5 single-writer rule — the OMS is the
//! only writer of the order table and the `PositionBook`).

pub mod oco;
pub mod order_book;
pub mod order_sizing;
pub mod oms_task;

pub use oco::OcoManager;
pub use order_book::{FillApplication, OrderBook};
pub use order_sizing::{OrderSizing, VenueInfo, VenueInfoCache};
pub use oms_task::{OmsTask, RETRY_BACKOFF_SECONDS};
