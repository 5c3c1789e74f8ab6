//! Order placement workflow.
//!
//! `OrderService` opens an order, then runs each requested item through
//! [`OrderAccumulator::add_line_item`] in its own transaction. A failed item
//! is reported and skipped; it never aborts the items around it. Failing to
//! open the order aborts the whole call.
//!
//! Every storage-touching call runs under an operation deadline. When the
//! deadline expires the in-flight future is dropped, which drops its
//! transaction and rolls the unit back. For writes the deadline stops short
//! of the commit, so an item reported as rejected was never persisted.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use shopfloor_core::{DomainError, Money, Quantity};
use shopfloor_parties::CustomerId;
use shopfloor_products::ProductId;
use shopfloor_sales::{LineItem, Order, OrderId};

use crate::deadline;
use crate::error::OrderingError;
use crate::order_accumulator::{OrderAccumulator, OrderDetails};
use crate::storage::Storage;

/// Everything a caller supplies to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer_id: CustomerId,
    pub shipping_address: String,
    pub payment_method: String,
    #[serde(default)]
    pub items: Vec<RequestedItem>,
}

/// One (product, quantity) request. The quantity is validated per item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Why an item was not added.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Only reachable if the customer vanishes between header and item.
    CustomerNotFound,
    ProductNotFound,
    InsufficientStock,
    InvalidQuantity,
    OrderNotOpen,
    OrderNotFound,
    StorageFailure,
    InvariantViolation,
}

impl From<&OrderingError> for RejectionReason {
    fn from(err: &OrderingError) -> Self {
        match err {
            OrderingError::ProductNotFound(_) => RejectionReason::ProductNotFound,
            OrderingError::InsufficientStock { .. } => RejectionReason::InsufficientStock,
            OrderingError::Validation(_) => RejectionReason::InvalidQuantity,
            OrderingError::OrderNotOpen { .. } => RejectionReason::OrderNotOpen,
            OrderingError::OrderNotFound(_) => RejectionReason::OrderNotFound,
            OrderingError::Storage(_) => RejectionReason::StorageFailure,
            OrderingError::CustomerNotFound(_) => RejectionReason::CustomerNotFound,
            OrderingError::InvariantViolation(_) => RejectionReason::InvariantViolation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Added {
        line_no: u32,
        unit_price: Money,
        subtotal: Money,
    },
    Rejected {
        reason: RejectionReason,
        message: String,
        retryable: bool,
    },
}

impl ItemOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, ItemOutcome::Added { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub product_id: ProductId,
    pub quantity: i64,
    pub outcome: ItemOutcome,
}

/// Outcome of [`OrderService::place_order`]. `total` covers only the items
/// that were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    pub items: Vec<ItemResult>,
    pub total: Money,
}

#[derive(Debug, Clone)]
pub struct OrderService<S> {
    accumulator: OrderAccumulator<S>,
    deadline: Duration,
}

impl<S> OrderService<S>
where
    S: Storage + Clone,
{
    pub fn new(storage: S, deadline: Duration) -> Self {
        Self {
            accumulator: OrderAccumulator::new(storage).with_deadline(deadline),
            deadline,
        }
    }

    pub fn accumulator(&self) -> &OrderAccumulator<S> {
        &self.accumulator
    }

    /// Open an order and add every requested item, reporting each outcome.
    ///
    /// The order is left open; finalizing is a separate call.
    #[instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, item_count = request.items.len()),
        err
    )]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<OrderResult, OrderingError> {
        let order = self
            .accumulator
            .create_order(
                request.customer_id,
                &request.shipping_address,
                &request.payment_method,
            )
            .await?;
        let order_id = order.id_typed();

        let mut items = Vec::with_capacity(request.items.len());
        for requested in &request.items {
            let outcome = match self
                .add_item(order_id, requested.product_id, requested.quantity)
                .await
            {
                Ok(line) => ItemOutcome::Added {
                    line_no: line.line_no,
                    unit_price: line.unit_price,
                    subtotal: line.subtotal,
                },
                Err(err) => ItemOutcome::Rejected {
                    reason: RejectionReason::from(&err),
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                },
            };
            items.push(ItemResult {
                product_id: requested.product_id,
                quantity: requested.quantity,
                outcome,
            });
        }

        let total = Money::checked_sum(items.iter().filter_map(|item| match item.outcome {
            ItemOutcome::Added { subtotal, .. } => Some(subtotal),
            ItemOutcome::Rejected { .. } => None,
        }))
        .ok_or_else(|| OrderingError::InvariantViolation(format!("order {order_id} total overflow")))?;

        let added = items.iter().filter(|i| i.outcome.is_added()).count();
        tracing::info!(
            order_id = %order_id,
            added,
            rejected = items.len() - added,
            total = %total,
            "order placed"
        );

        Ok(OrderResult {
            order_id,
            items,
            total,
        })
    }

    /// Add a single item to an open order.
    pub async fn add_item(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<LineItem, OrderingError> {
        let result = match Quantity::new(quantity) {
            Ok(quantity) => {
                self.accumulator
                    .add_line_item(order_id, product_id, quantity)
                    .await
            }
            Err(err) => Err(invalid_quantity(quantity, err)),
        };

        if let Err(err) = &result {
            tracing::warn!(
                order_id = %order_id,
                product_id = %product_id,
                quantity,
                retryable = err.is_retryable(),
                "item rejected: {err}"
            );
        }
        result
    }

    pub async fn finalize(&self, order_id: OrderId) -> Result<Money, OrderingError> {
        self.accumulator.finalize(order_id).await
    }

    pub async fn order_details(&self, order_id: OrderId) -> Result<OrderDetails, OrderingError> {
        self.within("order_details", self.accumulator.order_details(order_id))
            .await
    }

    pub async fn list_orders(
        &self,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Order>, OrderingError> {
        self.within("list_orders", self.accumulator.list_orders(customer_id))
            .await
    }

    /// Advisory stock pre-check; never relied on when adding items.
    pub async fn check_available(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<bool, OrderingError> {
        let quantity = Quantity::new(quantity).map_err(|e| invalid_quantity(quantity, e))?;
        self.within(
            "check_available",
            self.accumulator.ledger().check_available(product_id, quantity),
        )
        .await
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        fut: impl std::future::Future<Output = Result<T, OrderingError>>,
    ) -> Result<T, OrderingError> {
        deadline::within(Some(self.deadline), operation, fut).await
    }
}

fn invalid_quantity(quantity: i64, err: DomainError) -> OrderingError {
    OrderingError::Validation(format!("quantity {quantity}: {err}"))
}
