use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::Money;
use shopfloor_infra::{OrderDetails, PlaceOrder, RequestedItem};
use shopfloor_sales::{LineItem, Order, OrderId, OrderStatus};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_id: String,
    pub shipping_address: String,
    pub payment_method: String,
    #[serde(default)]
    pub items: Vec<AddItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub quantity: Option<i64>,
}

impl PlaceOrderRequest {
    pub fn into_command(self) -> Result<PlaceOrder, axum::response::Response> {
        let customer_id = errors::parse_id(&self.customer_id, "customer")?;
        let items = self
            .items
            .iter()
            .map(|item| -> Result<RequestedItem, axum::response::Response> {
                Ok(RequestedItem {
                    product_id: errors::parse_id(&item.product_id, "product")?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PlaceOrder {
            customer_id,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            items,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct LineResponse {
    pub line_no: u32,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: u64,
    pub subtotal_cents: u64,
}

impl From<&LineItem> for LineResponse {
    fn from(line: &LineItem) -> Self {
        Self {
            line_no: line.line_no,
            product_id: line.product_id.to_string(),
            quantity: line.quantity.get(),
            unit_price_cents: line.unit_price.cents(),
            subtotal_cents: line.subtotal.cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub shipping_address: String,
    pub payment_method: String,
    pub status: OrderStatus,
    pub total_cents: u64,
    /// Decimal rendering of the total, e.g. `"30.00"`.
    pub total: String,
    pub line_count: u32,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<LineResponse>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id_typed().to_string(),
            customer_id: order.customer_id().to_string(),
            shipping_address: order.shipping_address().to_string(),
            payment_method: order.payment_method().to_string(),
            status: order.status(),
            total_cents: order.total().cents(),
            total: order.total().to_string(),
            line_count: order.line_count(),
            opened_at: order.opened_at(),
            closed_at: order.closed_at(),
            lines: None,
        }
    }
}

impl From<&OrderDetails> for OrderResponse {
    fn from(details: &OrderDetails) -> Self {
        Self {
            lines: Some(details.lines.iter().map(LineResponse::from).collect()),
            ..OrderResponse::from(&details.order)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub total_cents: u64,
    pub total: String,
}

impl FinalizeResponse {
    pub fn closed(order_id: OrderId, total: Money) -> Self {
        Self {
            order_id: order_id.to_string(),
            status: OrderStatus::Closed,
            total_cents: total.cents(),
            total: total.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub product_id: String,
    pub quantity: i64,
    pub available: bool,
}
