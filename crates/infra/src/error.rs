use thiserror::Error;

use shopfloor_core::{DomainError, Quantity, StockLevel};
use shopfloor_inventory::StockError;
use shopfloor_parties::CustomerId;
use shopfloor_products::ProductId;
use shopfloor_sales::{OrderError, OrderId, OrderStatus};

use crate::storage::StorageError;

/// Error surfaced by the ordering workflow.
///
/// Domain errors are deterministic: retrying the same call gives the same
/// answer. Only [`OrderingError::Storage`] is retryable, and by the time a
/// caller sees it the unit of work it interrupted has been rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderingError {
    /// Unknown or inactive customer.
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    /// Unknown or inactive product.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: Quantity,
        available: StockLevel,
    },

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {order_id} is {status}, not open")]
    OrderNotOpen { order_id: OrderId, status: OrderStatus },

    #[error("validation failed: {0}")]
    Validation(String),

    /// Stored state contradicts a workflow invariant (for example a total
    /// that no longer matches its lines).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl OrderingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderingError::Storage(_))
    }

    pub(crate) fn timeout(operation: &str) -> Self {
        OrderingError::Storage(StorageError::Timeout(format!("{operation} exceeded its deadline")))
    }
}

impl From<StockError> for OrderingError {
    fn from(value: StockError) -> Self {
        match value {
            StockError::ProductNotFound(id) => OrderingError::ProductNotFound(id),
            StockError::InsufficientStock {
                product_id,
                requested,
                available,
            } => OrderingError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StockError::Overflow(_) => OrderingError::InvariantViolation(value.to_string()),
        }
    }
}

impl From<OrderError> for OrderingError {
    fn from(value: OrderError) -> Self {
        match value {
            OrderError::CustomerNotFound(id) => OrderingError::CustomerNotFound(id),
            OrderError::OrderNotFound(id) => OrderingError::OrderNotFound(id),
            OrderError::OrderNotOpen { order_id, status } => {
                OrderingError::OrderNotOpen { order_id, status }
            }
            OrderError::Validation(msg) => OrderingError::Validation(msg),
            OrderError::TotalMismatch { .. }
            | OrderError::LineMismatch { .. }
            | OrderError::ForeignLine { .. }
            | OrderError::AmountOverflow(_) => OrderingError::InvariantViolation(value.to_string()),
        }
    }
}

impl From<DomainError> for OrderingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => OrderingError::Validation(msg),
            DomainError::InvariantViolation(msg) => OrderingError::InvariantViolation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_core::{AggregateId, Money};

    #[test]
    fn only_storage_failures_are_retryable() {
        let storage = OrderingError::from(StorageError::Timeout("lock".into()));
        assert!(storage.is_retryable());

        let product_id = ProductId::new(AggregateId::new());
        let stock = OrderingError::from(StockError::ProductNotFound(product_id));
        assert_eq!(stock, OrderingError::ProductNotFound(product_id));
        assert!(!stock.is_retryable());
    }

    #[test]
    fn drift_maps_to_invariant_violation() {
        let order_id = OrderId::new(AggregateId::new());
        let err = OrderingError::from(OrderError::TotalMismatch {
            order_id,
            recorded: Money::from_cents(100),
            computed: Money::from_cents(90),
        });
        assert!(matches!(err, OrderingError::InvariantViolation(_)));
    }
}
