use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopfloor_core::{AggregateId, DomainError, Entity, Money, Quantity};
use shopfloor_parties::{Customer, CustomerId};
use shopfloor_products::{Product, ProductId};

/// Order identifier, generated when the order header is created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<AggregateId>()
            .map(Self)
            .map_err(|_| DomainError::invalid_id(format!("OrderId: {s}")))
    }
}

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Closed => "closed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OrderStatus::Open),
            "closed" => Ok(OrderStatus::Closed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

/// Order line: product, quantity, snapshot unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Price captured from the product when the line was added.
    pub unit_price: Money,
    pub subtotal: Money,
}

impl LineItem {
    /// `unit_price × quantity`, recomputed from the stored parts.
    pub fn expected_subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Unknown or inactive customer.
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {order_id} is {status}, not open")]
    OrderNotOpen { order_id: OrderId, status: OrderStatus },

    #[error("validation failed: {0}")]
    Validation(String),

    /// The recorded total disagrees with the persisted line items.
    #[error("order {order_id} total drifted: recorded {recorded}, lines sum to {computed}")]
    TotalMismatch {
        order_id: OrderId,
        recorded: Money,
        computed: Money,
    },

    /// A stored line's subtotal disagrees with its quantity and unit price.
    #[error("order {order_id} line {line_no} subtotal does not match quantity x unit price")]
    LineMismatch { order_id: OrderId, line_no: u32 },

    #[error("line belongs to order {line_order_id}, not {order_id}")]
    ForeignLine {
        order_id: OrderId,
        line_order_id: OrderId,
    },

    #[error("amount overflow on order {0}")]
    AmountOverflow(OrderId),
}

impl From<DomainError> for OrderError {
    fn from(value: DomainError) -> Self {
        OrderError::Validation(value.to_string())
    }
}

/// Every persisted field of an order header, used to rebuild an [`Order`]
/// from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub shipping_address: String,
    pub payment_method: String,
    pub status: OrderStatus,
    pub total: Money,
    pub line_count: u32,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Order header with its running total.
///
/// The total is derived: it only moves through [`Order::record_line`], and
/// [`Order::close`] re-derives it from the persisted lines before closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    shipping_address: String,
    payment_method: String,
    status: OrderStatus,
    total: Money,
    line_count: u32,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Open a new order (status Open, total 0) for an active customer.
    pub fn open(
        id: OrderId,
        customer: &Customer,
        shipping_address: impl Into<String>,
        payment_method: impl Into<String>,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if !customer.is_active() {
            return Err(OrderError::CustomerNotFound(customer.id_typed()));
        }

        let shipping_address = shipping_address.into();
        if shipping_address.trim().is_empty() {
            return Err(OrderError::Validation(
                "shipping address cannot be empty".to_string(),
            ));
        }

        let payment_method = payment_method.into();
        if payment_method.trim().is_empty() {
            return Err(OrderError::Validation(
                "payment method cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id,
            customer_id: customer.id_typed(),
            shipping_address,
            payment_method,
            status: OrderStatus::Open,
            total: Money::ZERO,
            line_count: 0,
            opened_at,
            closed_at: None,
        })
    }

    pub fn restore(snapshot: OrderSnapshot) -> Self {
        Self {
            id: snapshot.id,
            customer_id: snapshot.customer_id,
            shipping_address: snapshot.shipping_address,
            payment_method: snapshot.payment_method,
            status: snapshot.status,
            total: snapshot.total,
            line_count: snapshot.line_count,
            opened_at: snapshot.opened_at,
            closed_at: snapshot.closed_at,
        }
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            customer_id: self.customer_id,
            shipping_address: self.shipping_address.clone(),
            payment_method: self.payment_method.clone(),
            status: self.status,
            total: self.total,
            line_count: self.line_count,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn shipping_address(&self) -> &str {
        &self.shipping_address
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn line_count(&self) -> u32 {
        self.line_count
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, OrderStatus::Open)
    }

    pub fn ensure_open(&self) -> Result<(), OrderError> {
        if !self.is_modifiable() {
            return Err(OrderError::OrderNotOpen {
                order_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Build the next line for `product`, snapshotting its current price.
    ///
    /// Does not mutate the order; pass the result to [`Order::record_line`]
    /// once the line has been stored.
    pub fn price_line(&self, product: &Product, quantity: Quantity) -> Result<LineItem, OrderError> {
        self.ensure_open()?;

        let unit_price = product.unit_price();
        let subtotal = unit_price
            .checked_mul(quantity)
            .ok_or(OrderError::AmountOverflow(self.id))?;

        Ok(LineItem {
            order_id: self.id,
            line_no: self.line_count + 1,
            product_id: product.id_typed(),
            quantity,
            unit_price,
            subtotal,
        })
    }

    /// Add a stored line's subtotal to the running total.
    pub fn record_line(&mut self, line: &LineItem) -> Result<(), OrderError> {
        self.ensure_open()?;
        if line.order_id != self.id {
            return Err(OrderError::ForeignLine {
                order_id: self.id,
                line_order_id: line.order_id,
            });
        }

        self.total = self
            .total
            .checked_add(line.subtotal)
            .ok_or(OrderError::AmountOverflow(self.id))?;
        self.line_count += 1;
        Ok(())
    }

    /// Close the order and return its final total.
    ///
    /// The total is re-derived from `lines` (the persisted line items) and
    /// must agree with the running total; a disagreement means something
    /// outside this workflow touched the order, and closing is refused.
    pub fn close(&mut self, lines: &[LineItem], closed_at: DateTime<Utc>) -> Result<Money, OrderError> {
        self.ensure_open()?;

        let computed = total_of(self.id, lines)?;
        if computed != self.total {
            return Err(OrderError::TotalMismatch {
                order_id: self.id,
                recorded: self.total,
                computed,
            });
        }

        self.status = OrderStatus::Closed;
        self.closed_at = Some(closed_at);
        Ok(self.total)
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Recompute an order total from its lines, checking every line on the way.
pub fn total_of(order_id: OrderId, lines: &[LineItem]) -> Result<Money, OrderError> {
    let mut total = Money::ZERO;
    for line in lines {
        if line.order_id != order_id {
            return Err(OrderError::ForeignLine {
                order_id,
                line_order_id: line.order_id,
            });
        }
        if line.expected_subtotal() != Some(line.subtotal) {
            return Err(OrderError::LineMismatch {
                order_id,
                line_no: line.line_no,
            });
        }
        total = total
            .checked_add(line.subtotal)
            .ok_or(OrderError::AmountOverflow(order_id))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_core::StockLevel;
    use shopfloor_parties::CustomerStatus;
    use shopfloor_products::CategoryId;

    fn test_order_id() -> OrderId {
        OrderId::new(AggregateId::new())
    }

    fn test_customer() -> Customer {
        Customer::new(CustomerId::new(AggregateId::new()), "Ada", "Lovelace", None).unwrap()
    }

    fn test_product(cents: u64) -> Product {
        Product::new(
            ProductId::new(AggregateId::new()),
            "Widget",
            CategoryId(1),
            Money::from_cents(cents),
            StockLevel::new(100).unwrap(),
        )
        .unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn open_order() -> Order {
        Order::open(test_order_id(), &test_customer(), "1 Main St", "card", test_time()).unwrap()
    }

    fn add(order: &mut Order, product: &Product, n: i64) -> LineItem {
        let line = order.price_line(product, qty(n)).unwrap();
        order.record_line(&line).unwrap();
        line
    }

    #[test]
    fn open_order_starts_empty() {
        let order = open_order();
        assert_eq!(order.status(), OrderStatus::Open);
        assert_eq!(order.total(), Money::ZERO);
        assert_eq!(order.line_count(), 0);
        assert!(order.closed_at().is_none());
    }

    #[test]
    fn inactive_customer_cannot_open_order() {
        let customer = test_customer().with_status(CustomerStatus::Deactivated);
        let err = Order::open(test_order_id(), &customer, "1 Main St", "card", test_time()).unwrap_err();
        assert_eq!(err, OrderError::CustomerNotFound(customer.id_typed()));
    }

    #[test]
    fn blank_shipping_address_is_rejected() {
        let err = Order::open(test_order_id(), &test_customer(), "  ", "card", test_time()).unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    #[test]
    fn price_line_snapshots_price_and_does_not_mutate() {
        let order = open_order();
        let product = test_product(1000);
        let before = order.clone();

        let line = order.price_line(&product, qty(3)).unwrap();

        assert_eq!(order, before);
        assert_eq!(line.line_no, 1);
        assert_eq!(line.unit_price, Money::from_cents(1000));
        assert_eq!(line.subtotal, Money::from_cents(3000));
    }

    #[test]
    fn record_line_moves_total_in_lock_step() {
        let mut order = open_order();
        let a = add(&mut order, &test_product(1000), 3);
        let b = add(&mut order, &test_product(250), 2);

        assert_eq!(order.total(), Money::from_cents(3500));
        assert_eq!(order.line_count(), 2);
        assert_eq!(b.line_no, 2);
        assert_eq!(total_of(order.id_typed(), &[a, b]).unwrap(), order.total());
    }

    #[test]
    fn later_price_change_does_not_touch_existing_line() {
        let mut order = open_order();
        let mut product = test_product(1000);
        let first = add(&mut order, &product, 1);

        product.set_unit_price(Money::from_cents(1500));
        let second = add(&mut order, &product, 1);

        assert_eq!(first.unit_price, Money::from_cents(1000));
        assert_eq!(second.unit_price, Money::from_cents(1500));
        assert_eq!(order.total(), Money::from_cents(2500));
    }

    #[test]
    fn close_empty_order_returns_zero() {
        let mut order = open_order();
        let total = order.close(&[], test_time()).unwrap();
        assert_eq!(total, Money::ZERO);
        assert_eq!(order.status(), OrderStatus::Closed);
        assert!(order.closed_at().is_some());
    }

    #[test]
    fn closed_order_rejects_new_lines() {
        let mut order = open_order();
        order.close(&[], test_time()).unwrap();

        let err = order.price_line(&test_product(100), qty(1)).unwrap_err();
        assert_eq!(
            err,
            OrderError::OrderNotOpen {
                order_id: order.id_typed(),
                status: OrderStatus::Closed,
            }
        );
    }

    #[test]
    fn close_refuses_drifted_total() {
        let mut order = open_order();
        let line = add(&mut order, &test_product(1000), 2);

        // Persisted lines lost one entry relative to the running total.
        let err = order.close(&[], test_time()).unwrap_err();
        assert!(matches!(err, OrderError::TotalMismatch { .. }));
        assert_eq!(order.status(), OrderStatus::Open);

        assert_eq!(order.close(&[line], test_time()).unwrap(), Money::from_cents(2000));
    }

    #[test]
    fn total_of_detects_tampered_line() {
        let mut order = open_order();
        let mut line = add(&mut order, &test_product(1000), 2);
        line.subtotal = Money::from_cents(1);
        let err = total_of(order.id_typed(), &[line]).unwrap_err();
        assert!(matches!(err, OrderError::LineMismatch { line_no: 1, .. }));
    }

    #[test]
    fn record_line_rejects_foreign_line() {
        let mut a = open_order();
        let b = open_order();
        let line = b.price_line(&test_product(100), qty(1)).unwrap();
        let err = a.record_line(&line).unwrap_err();
        assert!(matches!(err, OrderError::ForeignLine { .. }));
        assert_eq!(a.total(), Money::ZERO);
    }

    #[test]
    fn snapshot_restore_is_lossless() {
        let mut order = open_order();
        add(&mut order, &test_product(999), 4);
        assert_eq!(Order::restore(order.snapshot()), order);
    }

    #[test]
    fn status_parses_from_storage_string() {
        for s in [OrderStatus::Open, OrderStatus::Closed, OrderStatus::Cancelled] {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("pending".parse::<OrderStatus>().is_err());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: after every recorded line, total == sum of line subtotals.
            #[test]
            fn total_tracks_sum_of_lines(
                lines in proptest::collection::vec((0u64..100_000, 1i64..500), 0..40)
            ) {
                let mut order = open_order();
                let mut stored = Vec::new();
                for (cents, n) in lines {
                    let line = order.price_line(&test_product(cents), qty(n)).unwrap();
                    order.record_line(&line).unwrap();
                    stored.push(line);
                    prop_assert_eq!(total_of(order.id_typed(), &stored).unwrap(), order.total());
                }
                let expected = order.total();
                prop_assert_eq!(order.close(&stored, test_time()).unwrap(), expected);
            }
        }
    }
}
