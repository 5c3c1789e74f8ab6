//! Product catalog entity.
//!
//! Catalog browsing and maintenance are handled elsewhere; this crate only
//! defines what an order needs to know about a product: its price, whether it
//! can be sold, and how many units are on hand.

pub mod product;

pub use product::{CategoryId, Product, ProductId, ProductStatus};
