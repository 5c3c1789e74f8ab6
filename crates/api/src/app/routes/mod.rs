use axum::{routing::get, Router};

pub mod orders;
pub mod products;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/ready", get(system::ready))
        .nest("/orders", orders::router())
        .nest("/products", products::router())
}
