//! `shopfloor-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, and the value objects shared by the
//! catalog, stock and order modules.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod quantity;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use money::Money;
pub use quantity::{Quantity, StockLevel};
pub use value_object::ValueObject;
