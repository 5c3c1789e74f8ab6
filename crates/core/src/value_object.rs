//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. In this domain:
///
/// - [`Money`](crate::Money): an amount in the smallest currency unit
/// - [`Quantity`](crate::Quantity): a strictly positive number of units requested or sold
/// - [`StockLevel`](crate::StockLevel): a non-negative number of units on hand
///
/// A line item's snapshot price is a `Money` copied out of the product at the
/// moment the line is added. Because `Money` is a value, later catalog price
/// changes can never reach back into an existing order.
///
/// ## Design Constraints
///
/// The trait requires:
/// - **Clone**: Value objects should be cheap to copy (they're values, not references)
/// - **PartialEq**: Value objects are compared by their attribute values
/// - **Debug**: Value objects should be debuggable (helpful for logging, testing)
///
/// ```ignore
/// let a = Money::from_cents(1000);
/// let b = Money::from_cents(1000);
/// assert_eq!(a, b); // equal by value, not identity
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
