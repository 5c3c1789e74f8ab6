use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use shopfloor_infra::storage::StorageError;
use shopfloor_infra::OrderingError;

pub fn ordering_error_to_response(err: OrderingError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        OrderingError::CustomerNotFound(_) => json_error(StatusCode::NOT_FOUND, "customer_not_found", message),
        OrderingError::ProductNotFound(_) => json_error(StatusCode::NOT_FOUND, "product_not_found", message),
        OrderingError::OrderNotFound(_) => json_error(StatusCode::NOT_FOUND, "order_not_found", message),
        OrderingError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", message)
        }
        OrderingError::OrderNotOpen { .. } => json_error(StatusCode::CONFLICT, "order_not_open", message),
        OrderingError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        OrderingError::InvariantViolation(_) => {
            tracing::error!(error = %message, "invariant violation");
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        OrderingError::Storage(StorageError::Timeout(_)) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_timeout", message)
        }
        OrderingError::Storage(_) => {
            tracing::error!(error = %message, "storage failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_failure", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or query identifier, or produce a 400 response.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id: {raw}")))
}
