use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// 200 once the storage backend answers; 503 otherwise.
pub async fn ready(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.ping().await {
        Ok(()) => Json(serde_json::json!({
            "status": "ready",
            "backend": services.backend_name(),
        }))
        .into_response(),
        Err(e) => errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", e.to_string()),
    }
}
