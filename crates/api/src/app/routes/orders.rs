use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use orderflow_core::OrderId;

use crate::app::dto::{self, OrderResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order).patch(update_status))
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    body: Result<Json<dto::PlaceOrderRequest>, JsonRejection>,
) -> Response {
    let lines = match dto::json_body(body).and_then(dto::PlaceOrderRequest::into_lines) {
        Ok(lines) => lines,
        Err(response) => return response,
    };

    match services.orders.place_order(ctx.user_id(), &lines).await {
        Ok(order) => (StatusCode::CREATED, Json(OrderResponse::from(&order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
) -> Response {
    match services.orders.list_orders(ctx.actor()).await {
        Ok(orders) => Json(orders.iter().map(OrderResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(response) => return response,
    };

    match services.orders.get_order(order_id, ctx.actor()).await {
        Ok(order) => Json(OrderResponse::from(&order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateStatusRequest>, JsonRejection>,
) -> Response {
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(response) => return response,
    };
    let status = match dto::json_body(body).and_then(|req| req.status()) {
        Ok(status) => status,
        Err(response) => return response,
    };

    match services.orders.update_status(order_id, status, ctx.actor()).await {
        Ok(order) => Json(OrderResponse::from(&order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
