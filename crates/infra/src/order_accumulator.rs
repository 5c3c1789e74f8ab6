//! Order accumulator: one in-progress order, from header to close.
//!
//! Every mutating call runs in exactly one storage transaction. In
//! [`OrderAccumulator::add_line_item`] that transaction covers the stock
//! reservation, the line insert and the running-total update, so a failure
//! at any step leaves stock, lines and total exactly as they were.
//!
//! Lock order inside `add_line_item` is always: the order row, then the one
//! product row being reserved. No call holds more than one product lock.
//!
//! An optional deadline covers everything up to the commit. The commit itself
//! is awaited outside it: once a commit has been sent, the caller is told its
//! real outcome rather than a timeout that may hide a persisted change.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use shopfloor_core::{AggregateId, Money, Quantity};
use shopfloor_parties::CustomerId;
use shopfloor_products::ProductId;
use shopfloor_sales::{total_of, LineItem, Order, OrderId};

use crate::deadline::within;
use crate::error::OrderingError;
use crate::stock_ledger::StockLedger;
use crate::storage::{Storage, StorageTx};

/// An order header with its line items, ordered by line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<LineItem>,
}

#[derive(Debug, Clone)]
pub struct OrderAccumulator<S> {
    storage: S,
    ledger: StockLedger<S>,
    deadline: Option<Duration>,
}

impl<S> OrderAccumulator<S>
where
    S: Storage + Clone,
{
    pub fn new(storage: S) -> Self {
        Self {
            ledger: StockLedger::new(storage.clone()),
            storage,
            deadline: None,
        }
    }

    /// Bound the work before each commit by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    /// Open an order (status open, total 0) for an active customer.
    #[instrument(skip(self, shipping_address, payment_method), fields(customer_id = %customer_id), err)]
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        shipping_address: &str,
        payment_method: &str,
    ) -> Result<Order, OrderingError> {
        let (tx, order) = within(self.deadline, "create_order", async {
            let mut tx = self.storage.begin().await?;

            let customer = tx
                .find_customer(customer_id)
                .await?
                .ok_or(OrderingError::CustomerNotFound(customer_id))?;

            let order = Order::open(
                OrderId::new(AggregateId::new()),
                &customer,
                shipping_address,
                payment_method,
                Utc::now(),
            )?;

            tx.insert_order(&order).await?;
            Ok::<_, OrderingError>((tx, order))
        })
        .await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id_typed(), "order opened");
        Ok(order)
    }

    /// Reserve stock and append one line, as a single atomic unit.
    #[instrument(
        skip(self),
        fields(order_id = %order_id, product_id = %product_id, quantity = %quantity),
        err
    )]
    pub async fn add_line_item(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<LineItem, OrderingError> {
        let (tx, line) = within(self.deadline, "add_line_item", async {
            let mut tx = self.storage.begin().await?;
            match self
                .add_line_item_in(&mut tx, order_id, product_id, quantity)
                .await
            {
                Ok(line) => Ok::<_, OrderingError>((tx, line)),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::error!(error = %rollback_err, "rollback after failed line item failed");
                    }
                    Err(err)
                }
            }
        })
        .await?;

        tx.commit().await?;
        tracing::info!(
            line_no = line.line_no,
            unit_price = %line.unit_price,
            subtotal = %line.subtotal,
            "line item added"
        );
        Ok(line)
    }

    async fn add_line_item_in(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<LineItem, OrderingError> {
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(OrderingError::OrderNotFound(order_id))?;
        order.ensure_open()?;

        // (a) reserve; the returned row carries the price we snapshot.
        let product = self.ledger.reserve_in(tx, product_id, quantity).await?;

        // (b) price, insert and total. Any error rolls (a) back with the rest.
        let line = order.price_line(&product, quantity)?;
        tx.insert_line_item(&line).await?;
        order.record_line(&line)?;

        let lines = tx.line_items(order_id).await?;
        let computed = total_of(order_id, &lines)?;
        if computed != order.total() {
            return Err(OrderingError::InvariantViolation(format!(
                "order {order_id} total {} does not match its lines ({computed})",
                order.total()
            )));
        }

        tx.update_order(&order).await?;
        Ok(line)
    }

    /// Close an open order and return its total, re-derived from the
    /// persisted lines.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn finalize(&self, order_id: OrderId) -> Result<Money, OrderingError> {
        let (tx, total, line_count) = within(self.deadline, "finalize", async {
            let mut tx = self.storage.begin().await?;

            let mut order = tx
                .lock_order(order_id)
                .await?
                .ok_or(OrderingError::OrderNotFound(order_id))?;
            let lines = tx.line_items(order_id).await?;
            let total = order.close(&lines, Utc::now())?;

            tx.update_order(&order).await?;
            Ok::<_, OrderingError>((tx, total, lines.len()))
        })
        .await?;
        tx.commit().await?;

        tracing::info!(total = %total, line_count, "order finalized");
        Ok(total)
    }

    /// Header and lines as of one committed state.
    pub async fn order_details(&self, order_id: OrderId) -> Result<OrderDetails, OrderingError> {
        let mut tx = self.storage.begin().await?;
        let (order, lines) = tx
            .read_order(order_id)
            .await?
            .ok_or(OrderingError::OrderNotFound(order_id))?;
        tx.rollback().await?;
        Ok(OrderDetails { order, lines })
    }

    pub async fn list_orders(
        &self,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Order>, OrderingError> {
        let mut tx = self.storage.begin().await?;
        let orders = tx.list_orders(customer_id).await?;
        tx.rollback().await?;
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FaultPoint, InMemoryStorage};
    use shopfloor_core::StockLevel;
    use shopfloor_parties::{Customer, CustomerStatus};
    use shopfloor_products::{CategoryId, Product};
    use shopfloor_sales::OrderStatus;

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    struct Fixture {
        storage: InMemoryStorage,
        accumulator: OrderAccumulator<InMemoryStorage>,
        customer_id: CustomerId,
        product_id: ProductId,
    }

    fn fixture(units: i64, price_cents: u64) -> Fixture {
        let storage = InMemoryStorage::new();
        let customer_id = CustomerId::new(AggregateId::new());
        storage
            .insert_customer(Customer::new(customer_id, "Grace", "Hopper", None).unwrap())
            .unwrap();
        let product_id = ProductId::new(AggregateId::new());
        storage
            .insert_product(
                Product::new(
                    product_id,
                    "Keyboard",
                    CategoryId(2),
                    Money::from_cents(price_cents),
                    StockLevel::new(units).unwrap(),
                )
                .unwrap(),
            )
            .unwrap();
        Fixture {
            accumulator: OrderAccumulator::new(storage.clone()),
            storage,
            customer_id,
            product_id,
        }
    }

    #[tokio::test]
    async fn create_order_rejects_unknown_customer() {
        let f = fixture(1, 100);
        let unknown = CustomerId::new(AggregateId::new());
        let err = f
            .accumulator
            .create_order(unknown, "1 Main St", "card")
            .await
            .unwrap_err();
        assert_eq!(err, OrderingError::CustomerNotFound(unknown));
        assert!(f.accumulator.list_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_order_rejects_deactivated_customer() {
        let f = fixture(1, 100);
        f.storage
            .set_customer_status(f.customer_id, CustomerStatus::Deactivated)
            .unwrap();
        let err = f
            .accumulator
            .create_order(f.customer_id, "1 Main St", "card")
            .await
            .unwrap_err();
        assert_eq!(err, OrderingError::CustomerNotFound(f.customer_id));
    }

    #[tokio::test]
    async fn add_line_item_updates_stock_lines_and_total_together() {
        let f = fixture(5, 1000);
        let order = f
            .accumulator
            .create_order(f.customer_id, "1 Main St", "card")
            .await
            .unwrap();

        let line = f
            .accumulator
            .add_line_item(order.id_typed(), f.product_id, qty(3))
            .await
            .unwrap();
        assert_eq!(line.line_no, 1);
        assert_eq!(line.subtotal, Money::from_cents(3000));

        let details = f.accumulator.order_details(order.id_typed()).await.unwrap();
        assert_eq!(details.order.total(), Money::from_cents(3000));
        assert_eq!(details.lines, vec![line]);
        assert_eq!(f.storage.product(f.product_id).unwrap().unwrap().available().get(), 2);
    }

    #[tokio::test]
    async fn failed_line_insert_rolls_back_reservation() {
        let f = fixture(5, 1000);
        let order = f
            .accumulator
            .create_order(f.customer_id, "1 Main St", "card")
            .await
            .unwrap();

        f.storage.inject_fault(FaultPoint::InsertLineItem);
        let err = f
            .accumulator
            .add_line_item(order.id_typed(), f.product_id, qty(2))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let details = f.accumulator.order_details(order.id_typed()).await.unwrap();
        assert_eq!(details.order.total(), Money::ZERO);
        assert!(details.lines.is_empty());
        assert_eq!(f.storage.product(f.product_id).unwrap().unwrap().available().get(), 5);
    }

    #[tokio::test]
    async fn finalize_refuses_drifted_total_and_leaves_order_open() {
        let f = fixture(5, 1000);
        let order = f
            .accumulator
            .create_order(f.customer_id, "1 Main St", "card")
            .await
            .unwrap();
        f.accumulator
            .add_line_item(order.id_typed(), f.product_id, qty(1))
            .await
            .unwrap();

        let (stored, _) = f.storage.order(order.id_typed()).unwrap().unwrap();
        let mut drifted = stored.snapshot();
        drifted.total = Money::from_cents(1);
        f.storage.overwrite_order(Order::restore(drifted)).unwrap();

        let err = f.accumulator.finalize(order.id_typed()).await.unwrap_err();
        assert!(matches!(err, OrderingError::InvariantViolation(_)));

        let (after, _) = f.storage.order(order.id_typed()).unwrap().unwrap();
        assert_eq!(after.status(), OrderStatus::Open);
    }

    #[tokio::test]
    async fn finalize_twice_is_order_not_open() {
        let f = fixture(5, 1000);
        let order = f
            .accumulator
            .create_order(f.customer_id, "1 Main St", "card")
            .await
            .unwrap();
        assert_eq!(f.accumulator.finalize(order.id_typed()).await.unwrap(), Money::ZERO);
        assert!(matches!(
            f.accumulator.finalize(order.id_typed()).await.unwrap_err(),
            OrderingError::OrderNotOpen { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found_and_reserves_nothing() {
        let f = fixture(5, 1000);
        let missing = OrderId::new(AggregateId::new());
        let err = f
            .accumulator
            .add_line_item(missing, f.product_id, qty(1))
            .await
            .unwrap_err();
        assert_eq!(err, OrderingError::OrderNotFound(missing));
        assert_eq!(f.storage.product(f.product_id).unwrap().unwrap().available().get(), 5);
    }
}
