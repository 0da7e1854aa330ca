use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use orderflow_core::ProductId;
use orderflow_inventory::Product;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new().route("/:id", get(get_product).put(put_product))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let product_id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(response) => return response,
    };

    match services.orders.get_product(product_id).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Create or replace a product (restock, repricing). Admin only.
pub async fn put_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::PutProductRequest>, JsonRejection>,
) -> Response {
    let product_id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(response) => return response,
    };
    let body = match dto::json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let product = match Product::new(product_id, body.name, body.price, body.stock) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    match services.orders.put_product(ctx.actor(), product).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
