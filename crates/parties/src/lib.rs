//! Customer directory entity.
//!
//! Registration and profile edits happen outside this workspace; orders only
//! need to know whether a customer exists and is active.

pub mod customer;

pub use customer::{Customer, CustomerId, CustomerStatus};
