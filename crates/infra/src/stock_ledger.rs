//! Stock ledger: the only writer of a product's available quantity.
//!
//! `reserve` is a single conditional decrement executed by the storage
//! backend, so two callers racing for the last unit cannot both win. The
//! read-only [`StockLedger::check_available`] is advisory; nothing relies on
//! it for correctness.

use tracing::instrument;

use shopfloor_core::{Quantity, StockLevel};
use shopfloor_inventory as inventory;
use shopfloor_products::{Product, ProductId};

use crate::error::OrderingError;
use crate::storage::{StockDecrement, Storage, StorageTx};

#[derive(Debug, Clone)]
pub struct StockLedger<S> {
    storage: S,
}

impl<S> StockLedger<S>
where
    S: Storage,
{
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// `false` when the product is missing, inactive, or short of `quantity`.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = %quantity), err)]
    pub async fn check_available(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, OrderingError> {
        let mut tx = self.storage.begin().await?;
        let product = tx.find_product(product_id).await?;
        tx.rollback().await?;
        Ok(inventory::check_available(product.as_ref(), quantity))
    }

    /// Reserve in a transaction of its own. Returns the remaining level.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = %quantity), err)]
    pub async fn reserve(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<StockLevel, OrderingError> {
        let mut tx = self.storage.begin().await?;
        // An error here drops `tx`, which rolls it back.
        let product = self.reserve_in(&mut tx, product_id, quantity).await?;
        tx.commit().await?;
        Ok(product.available())
    }

    /// Release in a transaction of its own. Returns the resulting level.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = %quantity), err)]
    pub async fn release(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<StockLevel, OrderingError> {
        let mut tx = self.storage.begin().await?;
        let product = self.release_in(&mut tx, product_id, quantity).await?;
        tx.commit().await?;
        Ok(product.available())
    }

    /// Conditional decrement inside the caller's transaction.
    ///
    /// Returns the product as it is after the decrement, so the caller can
    /// snapshot the price from the same row it just locked.
    pub async fn reserve_in(
        &self,
        tx: &mut S::Tx,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<Product, OrderingError> {
        match tx.decrement_stock(product_id, quantity).await? {
            StockDecrement::Applied(product) => {
                tracing::debug!(
                    product_id = %product_id,
                    quantity = quantity.get(),
                    remaining = product.available().get(),
                    "stock reserved"
                );
                Ok(product)
            }
            StockDecrement::Insufficient { available } => Err(OrderingError::InsufficientStock {
                product_id,
                requested: quantity,
                available,
            }),
            StockDecrement::Unavailable => Err(OrderingError::ProductNotFound(product_id)),
        }
    }

    /// Increment inside the caller's transaction.
    pub async fn release_in(
        &self,
        tx: &mut S::Tx,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<Product, OrderingError> {
        tx.increment_stock(product_id, quantity)
            .await?
            .ok_or(OrderingError::ProductNotFound(product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use shopfloor_core::{AggregateId, Money};
    use shopfloor_products::{CategoryId, ProductStatus};

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn ledger_with(units: i64) -> (StockLedger<InMemoryStorage>, InMemoryStorage, ProductId) {
        let storage = InMemoryStorage::new();
        let id = ProductId::new(AggregateId::new());
        storage
            .insert_product(
                Product::new(
                    id,
                    "Stapler",
                    CategoryId(3),
                    Money::from_cents(450),
                    StockLevel::new(units).unwrap(),
                )
                .unwrap(),
            )
            .unwrap();
        (StockLedger::new(storage.clone()), storage, id)
    }

    #[tokio::test]
    async fn reserve_then_release_restores_level() {
        let (ledger, _, id) = ledger_with(4);
        assert_eq!(ledger.reserve(id, qty(3)).await.unwrap().get(), 1);
        assert_eq!(ledger.release(id, qty(3)).await.unwrap().get(), 4);
    }

    #[tokio::test]
    async fn insufficient_reserve_reports_level_and_changes_nothing() {
        let (ledger, storage, id) = ledger_with(2);
        let err = ledger.reserve(id, qty(3)).await.unwrap_err();
        assert_eq!(
            err,
            OrderingError::InsufficientStock {
                product_id: id,
                requested: qty(3),
                available: StockLevel::new(2).unwrap(),
            }
        );
        assert_eq!(storage.product(id).unwrap().unwrap().available().get(), 2);
    }

    #[tokio::test]
    async fn inactive_or_missing_product_is_not_found() {
        let (ledger, storage, id) = ledger_with(10);
        storage.set_product_status(id, ProductStatus::Inactive).unwrap();
        assert_eq!(
            ledger.reserve(id, qty(1)).await.unwrap_err(),
            OrderingError::ProductNotFound(id)
        );
        assert!(!ledger.check_available(id, qty(1)).await.unwrap());

        let unknown = ProductId::new(AggregateId::new());
        assert_eq!(
            ledger.reserve(unknown, qty(1)).await.unwrap_err(),
            OrderingError::ProductNotFound(unknown)
        );
        assert_eq!(
            ledger.release(unknown, qty(1)).await.unwrap_err(),
            OrderingError::ProductNotFound(unknown)
        );
    }

    #[tokio::test]
    async fn works_through_a_shared_handle() {
        let (_, storage, id) = ledger_with(2);
        let ledger = StockLedger::new(std::sync::Arc::new(storage.clone()));
        assert_eq!(ledger.reserve(id, qty(2)).await.unwrap(), StockLevel::EMPTY);
        assert_eq!(storage.product(id).unwrap().unwrap().available().get(), 0);
    }

    #[tokio::test]
    async fn check_available_is_read_only() {
        let (ledger, storage, id) = ledger_with(3);
        assert!(ledger.check_available(id, qty(3)).await.unwrap());
        assert!(!ledger.check_available(id, qty(4)).await.unwrap());
        assert_eq!(storage.product(id).unwrap().unwrap().available().get(), 3);
    }
}
