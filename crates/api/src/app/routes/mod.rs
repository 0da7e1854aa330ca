use axum::{Router, routing::get};

pub mod orders;
pub mod products;
pub mod stream;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/orders", orders::router())
        .nest("/products", products::router())
}
