use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use shopfloor_products::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:id/availability", get(availability))
}

/// Advisory stock check; holds nothing.
pub async fn availability(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::AvailabilityQuery>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&id, "product") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let quantity = query.quantity.unwrap_or(1);

    match services.check_available(product_id, quantity).await {
        Ok(available) => Json(dto::AvailabilityResponse {
            product_id: product_id.to_string(),
            quantity,
            available,
        })
        .into_response(),
        Err(e) => errors::ordering_error_to_response(e),
    }
}
