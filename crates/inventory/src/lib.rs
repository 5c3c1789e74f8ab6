//! Stock ledger rules.
//!
//! This crate decides whether a stock movement is allowed and what the
//! resulting level is, implemented purely as deterministic domain logic (no
//! IO, no locking, no storage). Storage backends call [`apply_movement`]
//! while holding the product row lock, which is what makes a reservation a
//! single check-and-decrement step.

pub mod stock;

pub use stock::{apply_movement, check_available, StockError, StockMovement};
