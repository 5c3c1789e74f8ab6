//! Sales orders domain module.
//!
//! This crate contains the business rules for an order being captured at the
//! point of sale, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage). Persisting an order and reserving the stock behind each
//! line is the infrastructure layer's job; this crate decides what a valid
//! next state looks like.

pub mod order;

pub use order::{total_of, LineItem, Order, OrderError, OrderId, OrderSnapshot, OrderStatus};
