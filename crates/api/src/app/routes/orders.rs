use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use shopfloor_parties::CustomerId;
use shopfloor_products::ProductId;
use shopfloor_sales::OrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/items", post(add_item))
        .route("/:id/finalize", post(finalize_order))
}

/// Open an order and add every requested item. Per-item failures are
/// reported in the body; the order itself is still created (201).
pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    let command = match body.into_command() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.place_order(command).await {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(e) => errors::ordering_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> axum::response::Response {
    let customer_id: Option<CustomerId> = match query.customer_id.as_deref() {
        Some(raw) => match errors::parse_id(raw, "customer") {
            Ok(id) => Some(id),
            Err(resp) => return resp,
        },
        None => None,
    };

    match services.list_orders(customer_id).await {
        Ok(orders) => Json(orders.iter().map(dto::OrderResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::ordering_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.order_details(order_id).await {
        Ok(details) => Json(dto::OrderResponse::from(&details)).into_response(),
        Err(e) => errors::ordering_error_to_response(e),
    }
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddItemRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let product_id: ProductId = match errors::parse_id(&body.product_id, "product") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.add_item(order_id, product_id, body.quantity).await {
        Ok(line) => Json(dto::LineResponse::from(&line)).into_response(),
        Err(e) => errors::ordering_error_to_response(e),
    }
}

pub async fn finalize_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.finalize(order_id).await {
        Ok(total) => Json(dto::FinalizeResponse::closed(order_id, total)).into_response(),
        Err(e) => errors::ordering_error_to_response(e),
    }
}
