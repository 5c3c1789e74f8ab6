//! Infrastructure layer: storage backends, the ordering workflow that runs
//! on top of them, configuration and dev seeding.

pub mod config;
mod deadline;
pub mod error;
pub mod order_accumulator;
pub mod order_service;
pub mod seed;
pub mod stock_ledger;
pub mod storage;


pub use error::OrderingError;
pub use order_accumulator::{OrderAccumulator, OrderDetails};
pub use order_service::{
    ItemOutcome, ItemResult, OrderResult, OrderService, PlaceOrder, RejectionReason, RequestedItem,
};
pub use stock_ledger::StockLedger;
