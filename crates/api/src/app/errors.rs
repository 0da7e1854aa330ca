use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use orderflow_infra::OrderServiceError;

pub fn service_error_to_response(err: OrderServiceError) -> Response {
    match err {
        OrderServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        OrderServiceError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        e @ OrderServiceError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", e.to_string())
        }
        e @ OrderServiceError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", e.to_string())
        }
        OrderServiceError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        OrderServiceError::Contention(msg) => {
            let mut response = json_error(StatusCode::SERVICE_UNAVAILABLE, "contention", msg);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
            response
        }
        OrderServiceError::Store(msg) => {
            tracing::error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal storage error")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
