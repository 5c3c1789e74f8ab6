use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use shopfloor_core::{Quantity, StockLevel};
use shopfloor_parties::{Customer, CustomerId};
use shopfloor_products::{Product, ProductId};
use shopfloor_sales::{LineItem, Order, OrderId};

/// Storage operation error.
///
/// These are **infrastructure errors** (connectivity, timeouts, constraint
/// violations) as opposed to domain errors (validation, stock, order state).
/// Every variant is surfaced to callers as a retryable storage failure; the
/// transaction that hit it is rolled back as a whole.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result of an atomic conditional stock decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockDecrement {
    /// Units were taken; the product as it is after the decrement.
    Applied(Product),
    /// Not enough units; nothing changed.
    Insufficient { available: StockLevel },
    /// Product is missing or inactive; nothing changed.
    Unavailable,
}

/// Opens transactions against a backend.
///
/// Implementations must provide at least read-committed isolation and a
/// per-product row lock strong enough to make [`StorageTx::decrement_stock`]
/// linearizable for a given product.
#[async_trait]
pub trait Storage: Send + Sync {
    type Tx: StorageTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError>;
}

#[async_trait]
impl<S> Storage for Arc<S>
where
    S: Storage + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        (**self).begin().await
    }
}

/// An open transaction.
///
/// Nothing written through a transaction is visible to others until
/// [`commit`](StorageTx::commit); dropping a transaction without committing
/// rolls it back. That drop rule is what keeps a cancelled or timed-out
/// operation free of partial effects.
#[async_trait]
pub trait StorageTx: Send + Sized {
    /// Product catalog lookup (price and active flag).
    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>, StorageError>;

    /// Customer directory lookup.
    async fn find_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StorageError>;

    /// Take `quantity` units out of an active product, only if at least that
    /// many are on hand. The check and the decrement are one atomic step.
    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<StockDecrement, StorageError>;

    /// Put `quantity` units back. `None` if the product does not exist.
    async fn increment_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<Option<Product>, StorageError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StorageError>;

    /// Load an order header and hold its row lock until the transaction ends.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StorageError>;

    /// Load an order header and its lines (ordered by line number) without
    /// taking the exclusive row lock. Both come from one consistent view, so
    /// the header total always equals the sum of the returned subtotals.
    async fn read_order(
        &mut self,
        id: OrderId,
    ) -> Result<Option<(Order, Vec<LineItem>)>, StorageError>;

    /// Persist status/total/line count of an order locked by this transaction.
    async fn update_order(&mut self, order: &Order) -> Result<(), StorageError>;

    async fn insert_line_item(&mut self, line: &LineItem) -> Result<(), StorageError>;

    /// Line items of an order, ordered by line number.
    async fn line_items(&mut self, order_id: OrderId) -> Result<Vec<LineItem>, StorageError>;

    /// Order headers, oldest first, optionally for one customer.
    async fn list_orders(
        &mut self,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Order>, StorageError>;

    async fn commit(self) -> Result<(), StorageError>;

    async fn rollback(self) -> Result<(), StorageError>;
}
